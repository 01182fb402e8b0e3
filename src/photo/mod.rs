//! Photo handling: the captured photo, normalization, gallery picking and
//! the disk cache.

mod cache;
mod captured;
mod normalize;
mod picker;

pub use cache::{CacheEntry, PhotoCache};
pub use captured::{encode_data_url, CapturedPhoto, PhotoSource, JPEG_DATA_URL_PREFIX};
pub use normalize::{
    ImageNormalizer, JpegNormalizer, NormalizeError, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION,
};
pub use picker::{FilePicker, PhotoPicker, PickError};
