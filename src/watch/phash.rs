use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

pub type FrameHash = ImageHash;

pub fn frame_hash(frame: &DynamicImage) -> FrameHash {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(8, 8)
        .to_hasher();

    hasher.hash_image(frame)
}

pub fn hash_distance(lhs: &FrameHash, rhs: &FrameHash) -> u32 {
    lhs.dist(rhs)
}
