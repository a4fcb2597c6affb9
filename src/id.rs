//! Short stream-id generation

use nanoid::nanoid;

/// Length of generated stream ids
pub const ID_LENGTH: usize = 9;

/// Generate a short, URL-safe stream id
pub fn generate() -> String {
    nanoid!(ID_LENGTH)
}
