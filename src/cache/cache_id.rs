use sha2::{Digest, Sha256};

use crate::render::params::RenderParams;

/// Derive the cache namespace for a render configuration.
///
/// Returns `None` when the name is empty, the creation stamp is zero or the params are invalid:
/// frames may not be cached without a namespace.
pub fn generate_cache_id(params: &RenderParams, name: &str, created_ms: u64) -> Option<String> {
    if name.is_empty() || created_ms == 0 || !params.is_valid() {
        return None;
    }

    let mut h = Sha256::new();
    h.update(params.width.to_le_bytes());
    h.update(params.height.to_le_bytes());
    h.update(params.format.tag().as_bytes());
    h.update(params.divider.to_le_bytes());
    match params.audio {
        Some(audio) => {
            h.update([1u8]);
            h.update(audio.sample_rate.to_le_bytes());
            h.update(audio.channel_layout.to_le_bytes());
        }
        None => h.update([0u8]),
    }
    h.update((name.len() as u64).to_le_bytes());
    h.update(name.as_bytes());
    h.update(created_ms.to_le_bytes());
    Some(hex::encode(h.finalize()))
}

#[cfg(test)]
#[path = "../../tests/unit/cache/cache_id.rs"]
mod tests;
