//! Generation configuration records and the option setters composed over them.
//!
//! Each provider supplies its own defaults; callers pass an ordered list of
//! setters which are applied left to right, later setters of the same field
//! winning. Fields left unset keep the provider default and are omitted from
//! the wire rather than sent as zero values.

/// A self-contained mutation of a configuration record. Never fails.
pub trait OptionSetter<T> {
    fn apply(&self, target: &mut T);
}

/// Apply `options` in order over a copy of `defaults`.
pub fn compose<T: Clone, O: OptionSetter<T>>(defaults: &T, options: &[O]) -> T {
    let mut composed = defaults.clone();
    for option in options {
        option.apply(&mut composed);
    }
    composed
}

/// Output size: either a provider tag such as `"1024x1024"` or explicit dimensions.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSize {
    Tag(String),
    Dimensions { width: u32, height: u32 },
}

impl ImageSize {
    /// Resolve to a `(width, height)` pair, parsing `WxH` tags.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Dimensions { width, height } => Some((*width, *height)),
            Self::Tag(tag) => {
                let (w, h) = tag.split_once(['x', 'X', '*'])?;
                Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
            }
        }
    }

    /// Render as the tag form used by DALL-E style APIs.
    pub fn as_tag(&self) -> String {
        match self {
            Self::Tag(tag) => tag.clone(),
            Self::Dimensions { width, height } => format!("{width}x{height}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageOptions {
    pub negative_prompt: Option<String>,
    pub size: Option<ImageSize>,
    pub quality: Option<String>,
    pub style: Option<String>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f64>,
    /// `Some(0)` is forwarded as-is; the provider decides what zero means.
    pub seed: Option<i64>,
    pub model: Option<String>,
    pub reference_images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageOption {
    NegativePrompt(String),
    Size(String),
    Dimensions(u32, u32),
    Quality(String),
    Style(String),
    Steps(u32),
    CfgScale(f64),
    Seed(i64),
    Model(String),
    ReferenceImages(Vec<String>),
}

impl OptionSetter<ImageOptions> for ImageOption {
    fn apply(&self, o: &mut ImageOptions) {
        match self {
            Self::NegativePrompt(p) => o.negative_prompt = Some(p.clone()),
            Self::Size(tag) => o.size = Some(ImageSize::Tag(tag.clone())),
            Self::Dimensions(width, height) => {
                o.size = Some(ImageSize::Dimensions {
                    width: *width,
                    height: *height,
                })
            }
            Self::Quality(q) => o.quality = Some(q.clone()),
            Self::Style(s) => o.style = Some(s.clone()),
            Self::Steps(n) => o.steps = Some(*n),
            Self::CfgScale(scale) => o.cfg_scale = Some(*scale),
            Self::Seed(seed) => o.seed = Some(*seed),
            Self::Model(m) => o.model = Some(m.clone()),
            Self::ReferenceImages(images) => o.reference_images = images.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoOptions {
    pub model: Option<String>,
    pub duration_secs: Option<u32>,
    pub resolution: Option<String>,
    pub first_frame_image: Option<String>,
    pub last_frame_image: Option<String>,
    pub reference_images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoOption {
    Model(String),
    Duration(u32),
    Resolution(String),
    FirstFrame(String),
    LastFrame(String),
    ReferenceImages(Vec<String>),
}

impl OptionSetter<VideoOptions> for VideoOption {
    fn apply(&self, o: &mut VideoOptions) {
        match self {
            Self::Model(m) => o.model = Some(m.clone()),
            Self::Duration(secs) => o.duration_secs = Some(*secs),
            Self::Resolution(r) => o.resolution = Some(r.clone()),
            Self::FirstFrame(url) => o.first_frame_image = Some(url.clone()),
            Self::LastFrame(url) => o.last_frame_image = Some(url.clone()),
            Self::ReferenceImages(images) => o.reference_images = images.clone(),
        }
    }
}
