mod fingerprint;
mod pair;
mod score;
mod token;

pub use fingerprint::Fingerprint;
pub use pair::{PairCandidate, TxCountWindows, TxCounts, VolumeWindows};
pub use score::{Decision, Score};
pub use token::{HolderEntry, TokenRecord, TrendClass};
