//! Game ID generation.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of generated game IDs.
pub const GAME_ID_LEN: usize = 8;

/// Generate a fresh opaque game ID (8 ASCII alphanumerics).
pub fn generate_game_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GAME_ID_LEN)
        .map(char::from)
        .collect()
}

/// Whether `id` looks like something [`generate_game_id`] could produce.
pub fn is_valid_game_id(id: &str) -> bool {
    id.len() == GAME_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
