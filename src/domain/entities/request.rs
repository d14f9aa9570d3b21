//! Immutable description of one image load and transform pipeline.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use chrono::{DateTime, Utc};

use super::cache_key::{CacheKey, KeyBuilder};
use crate::domain::errors::RequestError;
use crate::domain::ports::Transformation;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Scheduling priority. `High` is the greatest value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Background work such as prefetching.
    Low,
    /// Regular loads.
    #[default]
    Normal,
    /// Urgent, user-visible loads.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Edge kept when center-cropping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Crop evenly on both sides.
    #[default]
    Center,
    /// Keep the top edge.
    Top,
    /// Keep the bottom edge.
    Bottom,
    /// Keep the left edge.
    Left,
    /// Keep the right edge.
    Right,
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Center => write!(f, "center"),
            Self::Top => write!(f, "top"),
            Self::Bottom => write!(f, "bottom"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// How the decoded image is fitted into the requested size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Fit {
    /// Plain resize, possibly distorting the aspect ratio.
    #[default]
    None,
    /// Scale to fill the bounds, then crop the overflow.
    CenterCrop(Alignment),
    /// Scale to fit entirely inside the bounds.
    CenterInside,
}

/// Target pixel layout of the final image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGBA.
    Rgba8,
    /// 8-bit RGB.
    Rgb8,
    /// 8-bit grayscale.
    Luma8,
    /// 8-bit grayscale with alpha.
    LumaA8,
}

/// Rotation in degrees about an optional pivot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Clockwise degrees.
    pub degrees: f32,
    /// Pivot point; the image center when absent.
    pub pivot: Option<(f32, f32)>,
}

bitflags! {
    /// Memory cache policy of a request.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct MemoryPolicy: u8 {
        /// Skip the memory cache lookup.
        const NO_CACHE = 1 << 0;
        /// Do not store the result in the memory cache.
        const NO_STORE = 1 << 1;
    }
}

impl MemoryPolicy {
    /// Returns true if the memory cache may be consulted.
    #[must_use]
    pub const fn should_read_from_memory_cache(self) -> bool {
        !self.contains(Self::NO_CACHE)
    }

    /// Returns true if the result may be stored in the memory cache.
    #[must_use]
    pub const fn should_write_to_memory_cache(self) -> bool {
        !self.contains(Self::NO_STORE)
    }
}

bitflags! {
    /// Network policy of a request, interpreted by request handlers.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct NetworkPolicy: u8 {
        /// Skip any local copy and go to the network.
        const NO_CACHE = 1 << 0;
        /// Do not keep a local copy of the response.
        const NO_STORE = 1 << 1;
        /// Only consult local copies, never the network.
        const OFFLINE = 1 << 2;
    }
}

impl NetworkPolicy {
    /// Returns true if only local copies may be used.
    #[must_use]
    pub const fn is_offline_only(self) -> bool {
        self.contains(Self::OFFLINE)
    }

    /// Returns true if a local copy may be read.
    #[must_use]
    pub const fn should_read_from_disk_cache(self) -> bool {
        !self.contains(Self::NO_CACHE)
    }

    /// Returns true if a local copy may be written.
    #[must_use]
    pub const fn should_write_to_disk_cache(self) -> bool {
        !self.contains(Self::NO_STORE)
    }
}

/// Location of the image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// URI or filesystem path.
    Uri(String),
    /// Platform resource identifier.
    Resource(u32),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri(uri) => f.write_str(uri),
            Self::Resource(id) => write!(f, "resource:{id}"),
        }
    }
}

struct RequestInner {
    id: u64,
    created_at: DateTime<Utc>,
    source: Source,
    stable_key: Option<String>,
    target_width: u32,
    target_height: u32,
    fit: Fit,
    only_scale_down: bool,
    rotation: Option<Rotation>,
    pixel_format: Option<PixelFormat>,
    transformations: Vec<Arc<dyn Transformation>>,
    memory_policy: MemoryPolicy,
    network_policy: NetworkPolicy,
    priority: Priority,
    headers: Vec<(String, String)>,
    key: CacheKey,
}

/// Fully resolved, immutable image request.
///
/// Cloning is cheap; all clones share the same description and key.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    /// Starts building a request for a URI or filesystem path.
    #[must_use]
    pub fn uri(uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Source::Uri(uri.into()))
    }

    /// Starts building a request for a platform resource.
    #[must_use]
    pub fn resource(id: u32) -> RequestBuilder {
        RequestBuilder::new(Source::Resource(id))
    }

    /// Monotonically increasing request id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Short id for log lines.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("[R{}]", self.inner.id)
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Source of the bytes.
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.inner.source
    }

    /// Returns the URI if this request points at one.
    #[must_use]
    pub fn uri_str(&self) -> Option<&str> {
        match &self.inner.source {
            Source::Uri(uri) => Some(uri),
            Source::Resource(_) => None,
        }
    }

    /// Caller supplied key overriding the source in the cache key.
    #[must_use]
    pub fn stable_key(&self) -> Option<&str> {
        self.inner.stable_key.as_deref()
    }

    /// Requested width, 0 when unconstrained.
    #[must_use]
    pub fn target_width(&self) -> u32 {
        self.inner.target_width
    }

    /// Requested height, 0 when unconstrained.
    #[must_use]
    pub fn target_height(&self) -> u32 {
        self.inner.target_height
    }

    /// Returns true if a resize was requested.
    #[must_use]
    pub fn has_size(&self) -> bool {
        self.inner.target_width != 0 || self.inner.target_height != 0
    }

    /// Fit mode.
    #[must_use]
    pub fn fit(&self) -> Fit {
        self.inner.fit
    }

    /// Returns true if images are never scaled up.
    #[must_use]
    pub fn only_scale_down(&self) -> bool {
        self.inner.only_scale_down
    }

    /// Rotation, if any.
    #[must_use]
    pub fn rotation(&self) -> Option<Rotation> {
        self.inner.rotation
    }

    /// Requested pixel format.
    #[must_use]
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.inner.pixel_format
    }

    /// Explicit transformations in application order.
    #[must_use]
    pub fn transformations(&self) -> &[Arc<dyn Transformation>] {
        &self.inner.transformations
    }

    /// Memory cache policy.
    #[must_use]
    pub fn memory_policy(&self) -> MemoryPolicy {
        self.inner.memory_policy
    }

    /// Network policy.
    #[must_use]
    pub fn network_policy(&self) -> NetworkPolicy {
        self.inner.network_policy
    }

    /// Priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Custom headers for network handlers.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.inner.headers
    }

    /// Derived cache key.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.inner.key
    }

    /// Returns true if the geometry step has work to do.
    #[must_use]
    pub fn needs_geometry_transform(&self) -> bool {
        self.has_size()
            || self.inner.rotation.is_some_and(|r| r.degrees != 0.0)
            || self.inner.pixel_format.is_some()
    }

    /// Returns true if any transformation step applies.
    #[must_use]
    pub fn needs_transformation(&self) -> bool {
        self.needs_geometry_transform() || !self.inner.transformations.is_empty()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("key", &self.inner.key)
            .field("priority", &self.inner.priority)
            .field("transformations", &self.inner.transformations.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request{{{}", self.inner.source)?;
        if self.has_size() {
            write!(
                f,
                " resize({},{})",
                self.inner.target_width, self.inner.target_height
            )?;
        }
        match self.inner.fit {
            Fit::CenterCrop(alignment) => write!(f, " centerCrop({alignment})")?,
            Fit::CenterInside => write!(f, " centerInside")?,
            Fit::None => {}
        }
        if let Some(rotation) = self.inner.rotation {
            write!(f, " rotation({}", rotation.degrees)?;
            if let Some((x, y)) = rotation.pivot {
                write!(f, " @ {x},{y}")?;
            }
            write!(f, ")")?;
        }
        for transformation in &self.inner.transformations {
            write!(f, " {}", transformation.key())?;
        }
        write!(f, "}}")
    }
}

/// Builder validating and freezing a [`Request`].
#[must_use]
pub struct RequestBuilder {
    source: Source,
    stable_key: Option<String>,
    resize: Option<(u32, u32)>,
    center_crop: Option<Alignment>,
    center_inside: bool,
    only_scale_down: bool,
    rotation: Option<Rotation>,
    pixel_format: Option<PixelFormat>,
    transformations: Vec<Arc<dyn Transformation>>,
    memory_policy: MemoryPolicy,
    network_policy: NetworkPolicy,
    priority: Priority,
    headers: Vec<(String, String)>,
}

impl RequestBuilder {
    fn new(source: Source) -> Self {
        Self {
            source,
            stable_key: None,
            resize: None,
            center_crop: None,
            center_inside: false,
            only_scale_down: false,
            rotation: None,
            pixel_format: None,
            transformations: Vec::new(),
            memory_policy: MemoryPolicy::empty(),
            network_policy: NetworkPolicy::empty(),
            priority: Priority::Normal,
            headers: Vec::new(),
        }
    }

    /// Uses `key` instead of the source in the cache key.
    pub fn stable_key(mut self, key: impl Into<String>) -> Self {
        self.stable_key = Some(key.into());
        self
    }

    /// Resizes to `width` x `height`; 0 leaves that axis unconstrained.
    pub const fn resize(mut self, width: u32, height: u32) -> Self {
        self.resize = Some((width, height));
        self
    }

    /// Center-crops to the resize bounds.
    pub const fn center_crop(self) -> Self {
        self.center_crop_aligned(Alignment::Center)
    }

    /// Crops to the resize bounds, keeping the given edge.
    pub const fn center_crop_aligned(mut self, alignment: Alignment) -> Self {
        self.center_crop = Some(alignment);
        self
    }

    /// Scales to fit entirely inside the resize bounds.
    pub const fn center_inside(mut self) -> Self {
        self.center_inside = true;
        self
    }

    /// Never scale the image up.
    pub const fn only_scale_down(mut self) -> Self {
        self.only_scale_down = true;
        self
    }

    /// Rotates about the image center.
    pub const fn rotate(mut self, degrees: f32) -> Self {
        self.rotation = Some(Rotation {
            degrees,
            pivot: None,
        });
        self
    }

    /// Rotates about a pivot point.
    pub const fn rotate_about(mut self, degrees: f32, pivot_x: f32, pivot_y: f32) -> Self {
        self.rotation = Some(Rotation {
            degrees,
            pivot: Some((pivot_x, pivot_y)),
        });
        self
    }

    /// Converts the final image to `format`.
    pub const fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = Some(format);
        self
    }

    /// Appends a transformation; order matters.
    pub fn transform(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Adds memory cache policy flags.
    pub fn memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy |= policy;
        self
    }

    /// Adds network policy flags.
    pub fn network_policy(mut self, policy: NetworkPolicy) -> Self {
        self.network_policy |= policy;
        self
    }

    /// Sets the priority.
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Validates and freezes the request.
    ///
    /// # Errors
    /// Returns `RequestError` when the source is empty, the fit modes
    /// conflict or lack a resize, or a transformation key is empty.
    pub fn build(self) -> Result<Request, RequestError> {
        match &self.source {
            Source::Uri(uri) if uri.trim().is_empty() => return Err(RequestError::EmptyUri),
            Source::Resource(0) => return Err(RequestError::InvalidResourceId),
            _ => {}
        }

        if self.resize == Some((0, 0)) {
            return Err(RequestError::EmptyResize);
        }
        let (target_width, target_height) = self.resize.unwrap_or((0, 0));
        let has_size = target_width != 0 || target_height != 0;

        if self.center_crop.is_some() && self.center_inside {
            return Err(RequestError::ConflictingFit);
        }
        if self.center_crop.is_some() && !has_size {
            return Err(RequestError::center_crop_without_resize());
        }
        if self.center_inside && !has_size {
            return Err(RequestError::center_inside_without_resize());
        }
        if self.only_scale_down && !has_size {
            return Err(RequestError::ScaleDownWithoutResize);
        }

        if let Some(rotation) = self.rotation {
            if !rotation.degrees.is_finite() {
                return Err(RequestError::InvalidRotation {
                    degrees: rotation.degrees,
                });
            }
            if rotation.pivot.is_some() && rotation.degrees == 0.0 {
                return Err(RequestError::PivotWithoutRotation);
            }
        }

        if self.transformations.iter().any(|t| t.key().is_empty()) {
            return Err(RequestError::EmptyTransformationKey);
        }

        let fit = match (self.center_crop, self.center_inside) {
            (Some(alignment), _) => Fit::CenterCrop(alignment),
            (None, true) => Fit::CenterInside,
            (None, false) => Fit::None,
        };
        let rotation = self.rotation.filter(|r| r.degrees != 0.0);

        let key = derive_key(
            self.stable_key.as_deref(),
            &self.source,
            rotation,
            (target_width, target_height),
            fit,
            &self.transformations,
        );

        Ok(Request {
            inner: Arc::new(RequestInner {
                id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                created_at: Utc::now(),
                source: self.source,
                stable_key: self.stable_key,
                target_width,
                target_height,
                fit,
                only_scale_down: self.only_scale_down,
                rotation,
                pixel_format: self.pixel_format,
                transformations: self.transformations,
                memory_policy: self.memory_policy,
                network_policy: self.network_policy,
                priority: self.priority,
                headers: self.headers,
                key,
            }),
        })
    }
}

fn derive_key(
    stable_key: Option<&str>,
    source: &Source,
    rotation: Option<Rotation>,
    (width, height): (u32, u32),
    fit: Fit,
    transformations: &[Arc<dyn Transformation>],
) -> CacheKey {
    let mut key = KeyBuilder::with_capacity(64);

    match stable_key {
        Some(stable) => key.segment(format_args!("{stable}")),
        None => key.segment(format_args!("{source}")),
    };

    if let Some(rotation) = rotation {
        match rotation.pivot {
            Some((x, y)) => key.segment(format_args!("rotation:{}@{x}x{y}", rotation.degrees)),
            None => key.segment(format_args!("rotation:{}", rotation.degrees)),
        };
    }

    if width != 0 || height != 0 {
        key.segment(format_args!("resize:{width}x{height}"));
    }

    match fit {
        Fit::CenterCrop(alignment) => {
            key.segment(format_args!("centerCrop:{alignment}"));
        }
        Fit::CenterInside => {
            key.segment(format_args!("centerInside"));
        }
        Fit::None => {}
    }

    for transformation in transformations {
        key.segment(format_args!("{}", transformation.key()));
    }

    key.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::KeyedTransformation;
    use test_case::test_case;
    use tokio_test::{assert_err, assert_ok};

    fn keyed(key: &str) -> Arc<dyn Transformation> {
        Arc::new(KeyedTransformation::new(key))
    }

    #[test]
    fn test_key_plain_source() {
        let request = assert_ok!(Request::uri("https://img/a.png").build());
        assert_eq!(request.key().as_str(), "https://img/a.png\n");
    }

    #[test]
    fn test_key_segment_order() {
        let request = assert_ok!(
            Request::uri("a.png")
                .rotate_about(90.0, 1.0, 2.0)
                .resize(100, 50)
                .center_crop_aligned(Alignment::Top)
                .transform(keyed("blur"))
                .transform(keyed("round"))
                .build()
        );
        assert_eq!(
            request.key().as_str(),
            "a.png\nrotation:90@1x2\nresize:100x50\ncenterCrop:top\nblur\nround\n"
        );
    }

    #[test]
    fn test_stable_key_replaces_source() {
        let request = assert_ok!(
            Request::uri("https://signed/a.png?sig=1")
                .stable_key("avatar-7")
                .resize(10, 10)
                .center_inside()
                .build()
        );
        assert_eq!(
            request.key().as_str(),
            "avatar-7\nresize:10x10\ncenterInside\n"
        );
    }

    #[test]
    fn test_transformation_order_changes_key() {
        let a = assert_ok!(
            Request::uri("a.png")
                .transform(keyed("blur"))
                .transform(keyed("gray"))
                .build()
        );
        let b = assert_ok!(
            Request::uri("a.png")
                .transform(keyed("gray"))
                .transform(keyed("blur"))
                .build()
        );
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_equal_descriptions_share_key_but_not_id() {
        let a = assert_ok!(Request::uri("a.png").resize(5, 5).build());
        let b = assert_ok!(
            Request::uri("a.png")
                .resize(5, 5)
                .priority(Priority::High)
                .build()
        );
        assert_eq!(a.key(), b.key());
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_zero_rotation_is_dropped() {
        let request = assert_ok!(Request::uri("a.png").rotate(0.0).build());
        assert!(request.rotation().is_none());
        assert!(!request.needs_transformation());
    }

    #[test_case(Request::uri("a").resize(1, 1).center_crop().center_inside(), RequestError::ConflictingFit ; "conflicting_fit")]
    #[test_case(Request::uri("a").center_crop(), RequestError::center_crop_without_resize() ; "crop_without_resize")]
    #[test_case(Request::uri("a").center_inside(), RequestError::center_inside_without_resize() ; "inside_without_resize")]
    #[test_case(Request::uri("a").only_scale_down(), RequestError::ScaleDownWithoutResize ; "scale_down_without_resize")]
    #[test_case(Request::uri("a").resize(0, 0), RequestError::EmptyResize ; "empty_resize")]
    #[test_case(Request::uri("  "), RequestError::EmptyUri ; "empty_uri")]
    #[test_case(Request::resource(0), RequestError::InvalidResourceId ; "zero_resource")]
    #[test_case(Request::uri("a").rotate_about(0.0, 1.0, 1.0), RequestError::PivotWithoutRotation ; "pivot_without_rotation")]
    #[test_case(Request::uri("a").transform(keyed("")), RequestError::EmptyTransformationKey ; "empty_transformation_key")]
    fn test_build_validation(builder: RequestBuilder, expected: RequestError) {
        let err = assert_err!(builder.build());
        assert_eq!(err, expected);
    }

    #[test]
    fn test_non_finite_rotation_is_rejected() {
        let err = assert_err!(Request::uri("a").rotate(f32::INFINITY).build());
        assert_eq!(
            err,
            RequestError::InvalidRotation {
                degrees: f32::INFINITY
            }
        );

        let err = assert_err!(Request::uri("a").rotate(f32::NAN).build());
        assert!(matches!(err, RequestError::InvalidRotation { degrees } if degrees.is_nan()));
    }

    #[test]
    fn test_single_axis_resize_is_valid_for_center_inside() {
        let request = assert_ok!(Request::uri("a").resize(0, 40).center_inside().build());
        assert!(request.has_size());
        assert_eq!(request.fit(), Fit::CenterInside);
    }

    #[test]
    fn test_resource_source_key() {
        let request = assert_ok!(Request::resource(42).build());
        assert_eq!(request.key().as_str(), "resource:42\n");
        assert!(request.key().matches_source("resource:42"));
    }

    #[test]
    fn test_policies() {
        let request = assert_ok!(
            Request::uri("a")
                .memory_policy(MemoryPolicy::NO_CACHE)
                .network_policy(NetworkPolicy::OFFLINE)
                .build()
        );
        assert!(!request.memory_policy().should_read_from_memory_cache());
        assert!(request.memory_policy().should_write_to_memory_cache());
        assert!(request.network_policy().is_offline_only());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
