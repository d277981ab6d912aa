#![allow(
    clippy::cast_ptr_alignment,
    clippy::ptr_as_ptr,
    clippy::cast_possible_wrap
)]

/// XORs `payload` in place with `mask_key`, cycling the key by byte position.
///
/// Applying the same key twice restores the original bytes, so this both masks
/// outbound payloads and unmasks inbound ones.
pub fn mask(payload: &mut [u8], mask_key: [u8; 4]) {
    #[cfg(all(target_arch = "x86_64", feature = "simd_masking"))]
    if is_x86_feature_detected!("avx2") {
        // SAFETY: guarded by the runtime feature check above
        unsafe { mask_avx2(payload, mask_key) };
        return;
    }

    mask_words(payload, mask_key);
}

#[cfg(all(target_arch = "x86_64", feature = "simd_masking"))]
#[target_feature(enable = "avx2")]
unsafe fn mask_avx2(payload: &mut [u8], mask_key: [u8; 4]) {
    use std::arch::x86_64::{
        __m256i, _mm256_loadu_si256, _mm256_set1_epi32, _mm256_storeu_si256, _mm256_xor_si256,
    };

    let len = payload.len();
    let mask256 = _mm256_set1_epi32(u32::from_le_bytes(mask_key) as i32);

    let mut i = 0;
    while i + 32 <= len {
        unsafe {
            let ptr = payload.as_mut_ptr().add(i) as *mut __m256i;
            _mm256_storeu_si256(ptr, _mm256_xor_si256(_mm256_loadu_si256(ptr), mask256));
        }
        i += 32;
    }

    // 32 is a multiple of 4 so the key phase is unchanged for the tail
    mask_words(&mut payload[i..], mask_key);
}

fn mask_words(payload: &mut [u8], mask_key: [u8; 4]) {
    let key = u32::from_ne_bytes(mask_key);
    let mut words = payload.chunks_exact_mut(4);
    for word in &mut words {
        let masked = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]) ^ key;
        word.copy_from_slice(&masked.to_ne_bytes());
    }
    for (b, k) in words.into_remainder().iter_mut().zip(mask_key) {
        *b ^= k;
    }
}
