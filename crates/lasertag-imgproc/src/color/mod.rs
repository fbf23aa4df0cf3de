mod gray;
pub use gray::gray_from_rgb_u8;

mod hsv;
pub use hsv::hsv_from_rgb_u8;
