pub mod accel;
pub mod accumulate;
pub mod frame;
pub mod ray;
pub mod rng;
pub mod scene;
pub mod shade;
