//! Content and prompt fingerprints

use sha2::{Digest, Sha256};

/// SHA-256 of a document's content, hex encoded
///
/// This is the resume identity of a document: two paths with the same
/// content are the same document.
///
/// # Examples
///
/// ```
/// use folio_domain::content_hash;
///
/// let a = content_hash("# Paper\n\nAbstract.");
/// let b = content_hash("# Paper\n\nAbstract.");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Fingerprint of a module's prompt text and schema
///
/// Parts are length-prefixed so that moving text between the system and user
/// prompt still changes the hash.
pub fn prompt_hash(system_prompt: &str, user_prompt: &str, schema: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [system_prompt, user_prompt, schema] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
