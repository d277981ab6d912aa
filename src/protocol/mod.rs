mod mask;

pub use mask::mask;
