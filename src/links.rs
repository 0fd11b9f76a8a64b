const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
const YOUTUBE_WATCH: &str = "https://www.youtube.com/watch?v=";
const YOUTUBE_THUMB: &str = "https://i.ytimg.com/vi";

/// Image widths the TMDB image CDN serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    /// Grid posters.
    W185,
    W500,
    /// Detail header images.
    W780,
    Original,
}

impl ImageSize {
    fn as_path(&self) -> &'static str {
        match self {
            ImageSize::W185 => "w185",
            ImageSize::W500 => "w500",
            ImageSize::W780 => "w780",
            ImageSize::Original => "original",
        }
    }
}

pub fn image_url(path: &str, size: ImageSize) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    Some(format!("{IMAGE_BASE}/{}/{path}", size.as_path()))
}

pub fn youtube_watch_url(key: &str) -> String {
    format!("{YOUTUBE_WATCH}{}", urlencoding::encode(key))
}

pub fn youtube_thumbnail_url(key: &str) -> String {
    format!("{YOUTUBE_THUMB}/{}/hqdefault.jpg", urlencoding::encode(key))
}
