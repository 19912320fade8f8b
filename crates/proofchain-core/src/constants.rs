pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Upper bound on difficulty: the hex length of the shortest supported digest.
pub const MAX_DIFFICULTY: usize = HASH_HEX_SIZE;
pub const DEFAULT_DIFFICULTY: usize = 4;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const GENESIS_BATCH_RECORD: &str = "Genesis Transaction";
pub const GENESIS_SCALAR_PAYLOAD: &str = "Genesis Block - The beginning of the blockchain";
