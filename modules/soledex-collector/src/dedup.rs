//! Content-level image dedup: exact byte hash first, then 64-bit
//! perceptual hashes (8x8 average + difference) compared by Hamming
//! distance. A candidate is a duplicate only when *all* hash variants are
//! within the threshold — a single noisy variant must not reject a
//! genuinely new image.
//!
//! Everything here is pure given the set of existing hashes; no network
//! or disk access.

use std::collections::VecDeque;
use std::sync::Mutex;

use image::{imageops::FilterType, DynamicImage};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use soledex_store::StoredImageHash;

const HASH_SIZE: u32 = 8;

/// The perceptual hash variants computed for every candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHashes {
    pub ahash: u64,
    pub dhash: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    Unique,
    DuplicateOf(Uuid),
}

/// SHA-256 of the raw bytes, hex-encoded. The cheap exact-content path.
pub fn byte_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Compute both perceptual hash variants for a decoded image.
pub fn perceptual_hashes(img: &DynamicImage) -> ImageHashes {
    ImageHashes {
        ahash: average_hash(img),
        dhash: difference_hash(img),
    }
}

/// 8x8 average hash: downsample to grayscale, one bit per pixel set when
/// the pixel is at or above the mean. Row-major, MSB first.
fn average_hash(img: &DynamicImage) -> u64 {
    let small = img
        .resize_exact(HASH_SIZE, HASH_SIZE, FilterType::Triangle)
        .to_luma8();

    let sum: u64 = small.pixels().map(|p| p[0] as u64).sum();
    let mean = sum / (HASH_SIZE * HASH_SIZE) as u64;

    let mut hash = 0u64;
    for pixel in small.pixels() {
        hash <<= 1;
        if pixel[0] as u64 >= mean {
            hash |= 1;
        }
    }
    hash
}

/// 9x8 difference hash: one bit per horizontally adjacent pixel pair,
/// set when the left pixel is brighter. More robust than the average
/// hash against global brightness shifts.
fn difference_hash(img: &DynamicImage) -> u64 {
    let small = img
        .resize_exact(HASH_SIZE + 1, HASH_SIZE, FilterType::Triangle)
        .to_luma8();

    let mut hash = 0u64;
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            hash <<= 1;
            if small.get_pixel(x, y)[0] > small.get_pixel(x + 1, y)[0] {
                hash |= 1;
            }
        }
    }
    hash
}

/// Count of differing bits between two equal-length hashes.
pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Compare a candidate against previously accepted images. The exact
/// byte-hash check short-circuits before any Hamming comparison.
pub fn check_against(
    candidate_byte_hash: &str,
    candidate: &ImageHashes,
    existing: &[StoredImageHash],
    max_hamming: u32,
) -> DedupVerdict {
    for stored in existing {
        if stored.byte_hash == candidate_byte_hash {
            return DedupVerdict::DuplicateOf(stored.image_id);
        }
    }

    for stored in existing {
        let ahash_dist = hamming(candidate.ahash, stored.ahash);
        let dhash_dist = hamming(candidate.dhash, stored.dhash);
        if ahash_dist <= max_hamming && dhash_dist <= max_hamming {
            return DedupVerdict::DuplicateOf(stored.image_id);
        }
    }

    DedupVerdict::Unique
}

/// Ring buffer of recently accepted hashes across all items, shared by
/// the worker pool. Catches the same stock photo re-served for different
/// items within one run.
pub struct GlobalHashWindow {
    capacity: usize,
    entries: Mutex<VecDeque<(Uuid, ImageHashes)>>,
}

impl GlobalHashWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Find a near-duplicate in the recent window.
    pub fn find_match(&self, candidate: &ImageHashes, max_hamming: u32) -> Option<Uuid> {
        if self.capacity == 0 {
            return None;
        }
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .find(|(_, hashes)| {
                hamming(candidate.ahash, hashes.ahash) <= max_hamming
                    && hamming(candidate.dhash, hashes.dhash) <= max_hamming
            })
            .map(|(id, _)| *id)
    }

    /// Record a freshly accepted image, evicting the oldest entry when
    /// the window is full.
    pub fn push(&self, image_id: Uuid, hashes: ImageHashes) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back((image_id, hashes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, _| {
            Luma([((x * 255) / width.max(1)) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn stored(image_id: Uuid, byte_hash: &str, ahash: u64, dhash: u64) -> StoredImageHash {
        StoredImageHash {
            image_id,
            byte_hash: byte_hash.to_string(),
            ahash,
            dhash,
        }
    }

    /// A u64 with exactly `bits` bits set.
    fn bits(bits: u32) -> u64 {
        (1u64 << bits) - 1
    }

    #[test]
    fn hamming_counts_differing_bits() {
        assert_eq!(hamming(0, 0), 0);
        assert_eq!(hamming(0b1011, 0b0010), 2);
        assert_eq!(hamming(u64::MAX, 0), 64);
    }

    #[test]
    fn identical_images_hash_identically() {
        let img = gradient_image(64, 64);
        assert_eq!(perceptual_hashes(&img), perceptual_hashes(&img));
    }

    #[test]
    fn rescaled_image_is_a_near_duplicate() {
        let a = perceptual_hashes(&gradient_image(64, 64));
        let b = perceptual_hashes(&gradient_image(256, 256));
        assert!(hamming(a.ahash, b.ahash) <= 5);
        assert!(hamming(a.dhash, b.dhash) <= 5);
    }

    #[test]
    fn byte_hash_match_short_circuits() {
        let existing_id = Uuid::new_v4();
        // Perceptual hashes are maximally distant; the exact hash still wins.
        let existing = vec![stored(existing_id, "deadbeef", u64::MAX, u64::MAX)];
        let candidate = ImageHashes { ahash: 0, dhash: 0 };
        assert_eq!(
            check_against("deadbeef", &candidate, &existing, 5),
            DedupVerdict::DuplicateOf(existing_id)
        );
    }

    #[test]
    fn all_variants_within_threshold_is_duplicate() {
        let existing_id = Uuid::new_v4();
        let existing = vec![stored(existing_id, "aaaa", 0, 0)];
        // Distances [2, 3] against threshold 5.
        let candidate = ImageHashes {
            ahash: bits(2),
            dhash: bits(3),
        };
        assert_eq!(
            check_against("bbbb", &candidate, &existing, 5),
            DedupVerdict::DuplicateOf(existing_id)
        );
    }

    #[test]
    fn one_variant_over_threshold_is_unique() {
        let existing = vec![stored(Uuid::new_v4(), "aaaa", 0, 0)];
        // Distances [6, 1]: ahash fails the all-variants rule.
        let candidate = ImageHashes {
            ahash: bits(6),
            dhash: bits(1),
        };
        assert_eq!(
            check_against("bbbb", &candidate, &existing, 5),
            DedupVerdict::Unique
        );
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let existing_id = Uuid::new_v4();
        let existing = vec![stored(existing_id, "aaaa", 0, 0)];
        let candidate = ImageHashes {
            ahash: bits(5),
            dhash: bits(5),
        };
        assert_eq!(
            check_against("bbbb", &candidate, &existing, 5),
            DedupVerdict::DuplicateOf(existing_id)
        );
    }

    #[test]
    fn global_window_evicts_oldest() {
        let window = GlobalHashWindow::new(2);
        let first = Uuid::new_v4();
        let hashes = ImageHashes { ahash: 0, dhash: 0 };
        window.push(first, hashes);
        assert_eq!(window.find_match(&hashes, 0), Some(first));

        window.push(Uuid::new_v4(), ImageHashes { ahash: bits(20), dhash: bits(20) });
        window.push(Uuid::new_v4(), ImageHashes { ahash: bits(40), dhash: bits(40) });
        assert_eq!(window.find_match(&hashes, 0), None);
    }

    #[test]
    fn zero_capacity_disables_the_window() {
        let window = GlobalHashWindow::new(0);
        let hashes = ImageHashes { ahash: 0, dhash: 0 };
        window.push(Uuid::new_v4(), hashes);
        assert_eq!(window.find_match(&hashes, 64), None);
    }
}
