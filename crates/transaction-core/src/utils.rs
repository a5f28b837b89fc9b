use rand::{thread_rng, Rng};

/// RFC 3261 magic cookie every compliant branch starts with.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

const BRANCH_TOKEN_LEN: usize = 12;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a fresh branch parameter for a Via header this element originates.
pub fn generate_branch() -> String {
    let mut rng = thread_rng();
    let token: String = (0..BRANCH_TOKEN_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect();
    format!("{}{}", BRANCH_MAGIC_COOKIE, token)
}
