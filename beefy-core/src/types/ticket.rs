use crate::{H160, H256};

/// A relayer's exclusivity token for one in-flight submission. The
/// contract keys these by commitment hash; the engine additionally holds
/// at most one live ticket per relayer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    /// The relayer that opened the submission.
    pub owner: H160,
    /// Hash of the commitment being relayed.
    pub commitment_hash: H256,
}
