//! Counter-based per-pixel random number generator.
//!
//! Every (pixel, frame seed) pair owns an independent stream and all state
//! lives in two 32-bit lanes passed by value, so parallel pixels never
//! synchronize with each other.

/// Integer finalizer that turns packed pixel coordinates and frame seeds into
/// well-mixed lane values.
fn hash(mut seed: u32) -> u32 {
    seed = (seed ^ 61) ^ (seed >> 16);
    seed = seed.wrapping_mul(9);
    seed ^= seed >> 4;
    seed = seed.wrapping_mul(0x27d4eb2d);
    seed ^= seed >> 15;
    seed
}

#[derive(Clone, Copy, Debug)]
pub struct Crng {
    seed: [u32; 2],
}

impl Crng {
    /// Seeds one stream from a pixel coordinate and a frame seed. The stream
    /// is advanced once so the two hashed lanes mix before the first draw.
    pub fn new(pixel: [u32; 2], frame_seed: u32) -> Crng {
        let packed = (pixel[0] << 16) | pixel[1];
        let mut rng = Crng {
            seed: [hash(packed), hash(frame_seed)],
        };
        rng.next_u32();
        rng
    }

    /// Two-lane xorshift/rotate step; returns a uniform 32-bit deviate.
    pub fn next_u32(&mut self) -> u32 {
        let result = self.seed[0].wrapping_mul(0x9e3779bb);

        self.seed[1] ^= self.seed[0];
        self.seed[0] = self.seed[0].rotate_left(26) ^ self.seed[1] ^ (self.seed[1] << 9);
        self.seed[1] = self.seed[0].rotate_left(13);

        result
    }

    /// Uniform float in [0, 1): the high bits of the next deviate fill the
    /// mantissa of a number in [1, 2), then 1.0 is subtracted.
    pub fn uniform_f32(&mut self) -> f32 {
        let bits = 0x3f800000 | (self.next_u32() >> 9);
        f32::from_bits(bits) - 1.0
    }
}
