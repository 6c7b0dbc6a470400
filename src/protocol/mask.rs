/// XORs `payload` in place with the 4-byte masking key, starting at key index 0.
///
/// Applying it twice with the same key restores the input.
pub fn mask(payload: &mut [u8], mask_key: [u8; 4]) {
    // word-at-a-time over the aligned body, byte loop for the tail
    let key = u32::from_ne_bytes(mask_key);
    let wide = u64::from(key) | (u64::from(key) << 32);

    let mut chunks = payload.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ wide;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    let tail = chunks.into_remainder();
    for (i, b) in tail.iter_mut().enumerate() {
        *b ^= mask_key[i % 4];
    }
}
