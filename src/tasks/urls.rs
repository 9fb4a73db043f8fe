use crate::config::ClientConfig;

/// Maps the media locators the backend returns onto URLs the embedding UI
/// can load.
///
/// With a prefix configured for the media kind, the locator's file name is
/// re-rooted under that prefix (`https://b/static/videos/a.mp4` with prefix
/// `/api/simple-proxy/videos` becomes `/api/simple-proxy/videos/a.mp4`).
/// Without one, absolute URLs pass through and relative locators are joined
/// onto the static base.
#[derive(Debug, Clone)]
pub struct UrlMapper {
    static_base: String,
    video_prefix: Option<String>,
    audio_prefix: Option<String>,
}

impl UrlMapper {
    pub fn from_config(config: &ClientConfig) -> Self {
        let static_base = config
            .static_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(config.api_base())
            .trim_end_matches('/')
            .to_string();
        Self {
            static_base,
            video_prefix: config.video_prefix.clone(),
            audio_prefix: config.audio_prefix.clone(),
        }
    }

    pub fn video(&self, raw: Option<&str>) -> Option<String> {
        self.map(raw, self.video_prefix.as_deref())
    }

    pub fn audio(&self, raw: Option<&str>) -> Option<String> {
        self.map(raw, self.audio_prefix.as_deref())
    }

    fn map(&self, raw: Option<&str>, prefix: Option<&str>) -> Option<String> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;

        if let Some(prefix) = prefix {
            let name = file_name(raw)?;
            return Some(format!("{}/{}", prefix.trim_end_matches('/'), name));
        }

        if is_absolute(raw) {
            return Some(raw.to_string());
        }
        Some(format!("{}/{}", self.static_base, raw.trim_start_matches('/')))
    }
}

/// `scheme://host...` only. A bare `name:rest` parses as a URL too, but the
/// backend means it as a relative file name.
fn is_absolute(raw: &str) -> bool {
    raw.contains("://") && reqwest::Url::parse(raw).is_ok_and(|url| url.has_host())
}

/// Last path segment, without query or fragment.
fn file_name(raw: &str) -> Option<&str> {
    let path = raw.split(['?', '#']).next().unwrap_or(raw);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(f: impl FnOnce(&mut ClientConfig)) -> UrlMapper {
        let mut cfg = ClientConfig::with_base_url("https://api.example.test/v1/");
        f(&mut cfg);
        UrlMapper::from_config(&cfg)
    }

    #[test]
    fn relative_locator_is_joined_onto_api_base() {
        let m = mapper(|_| {});
        assert_eq!(
            m.video(Some("v1.mp4")).as_deref(),
            Some("https://api.example.test/v1/v1.mp4")
        );
        assert_eq!(
            m.audio(Some("/audio/a1.mp3")).as_deref(),
            Some("https://api.example.test/v1/audio/a1.mp3")
        );
    }

    #[test]
    fn static_base_overrides_api_base() {
        let m = mapper(|c| c.static_base_url = Some("/v1/static/".into()));
        assert_eq!(m.video(Some("v1.mp4")).as_deref(), Some("/v1/static/v1.mp4"));
    }

    #[test]
    fn absolute_locator_passes_through() {
        let m = mapper(|_| {});
        let url = "https://cdn.example.test/videos/abc.mp4?sig=1";
        assert_eq!(m.video(Some(url)).as_deref(), Some(url));
    }

    #[test]
    fn colon_in_a_relative_name_is_not_a_scheme() {
        let m = mapper(|_| {});
        assert_eq!(
            m.video(Some("v1:intro.mp4")).as_deref(),
            Some("https://api.example.test/v1/v1:intro.mp4")
        );
        assert_eq!(
            m.audio(Some("take:2/a1.mp3")).as_deref(),
            Some("https://api.example.test/v1/take:2/a1.mp3")
        );
    }

    #[test]
    fn prefix_reroots_file_name() {
        let m = mapper(|c| {
            c.video_prefix = Some("/api/simple-proxy/videos".into());
            c.audio_prefix = Some("/api/simple-proxy/audio/".into());
        });
        assert_eq!(
            m.video(Some("https://backend.test/static/videos/abc.mp4?x=1")).as_deref(),
            Some("/api/simple-proxy/videos/abc.mp4")
        );
        assert_eq!(
            m.audio(Some("narration.mp3")).as_deref(),
            Some("/api/simple-proxy/audio/narration.mp3")
        );
    }

    #[test]
    fn empty_locator_is_absent() {
        let m = mapper(|c| c.video_prefix = Some("/videos".into()));
        assert!(m.video(None).is_none());
        assert!(m.video(Some("  ")).is_none());
        assert!(m.audio(Some("")).is_none());
    }
}
