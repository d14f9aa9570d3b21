//! Domain entity definitions.

mod bitmap;
mod cache_key;
mod request;
mod tag;

pub use bitmap::{Bitmap, FetchResult, LoadedFrom, byte_size, is_released};
pub use cache_key::{CacheKey, KEY_SEPARATOR};
pub use request::{
    Alignment, Fit, MemoryPolicy, NetworkPolicy, PixelFormat, Priority, Request, RequestBuilder,
    Rotation, Source,
};
pub use tag::{Tag, TargetId};
