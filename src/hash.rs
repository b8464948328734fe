//! Difference hashing used to spot near-duplicate images.

use image::imageops::{self, FilterType};
use image::DynamicImage;

pub const DEFAULT_HASH_SIZE: u32 = 8;

pub const MIN_HASH_SIZE: u32 = 2;

/// Largest grid whose bits still fit in an [`ImageHash`].
pub const MAX_HASH_SIZE: u32 = 11;

pub fn is_valid_hash_size(hash_size: u32) -> bool {
    (MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&hash_size)
}

/// Packed difference-hash bits, bit `i` set for the `i`-th comparison in
/// raster order.
pub type ImageHash = u128;

/// Compute the difference hash of `image` on a `hash_size` grid.
///
/// The image is reduced to grayscale at `(hash_size + 1) x hash_size` and
/// every horizontally adjacent pair contributes one bit, set when the left
/// pixel is brighter than the right one.
///
/// Panics unless [`is_valid_hash_size`] holds for `hash_size`.
pub fn dhash(image: &DynamicImage, hash_size: u32) -> ImageHash {
    assert!(
        is_valid_hash_size(hash_size),
        "hash size {} out of range",
        hash_size
    );

    let gray = image.to_luma8();
    let resized = imageops::resize(&gray, hash_size + 1, hash_size, FilterType::Triangle);

    let mut hash: ImageHash = 0;
    let mut bit = 0;
    for y in 0..hash_size {
        for x in 0..hash_size {
            let left = resized.get_pixel(x, y)[0];
            let right = resized.get_pixel(x + 1, y)[0];
            if left > right {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}
