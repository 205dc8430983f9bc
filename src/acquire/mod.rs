//! Scene media acquisition: provider abstraction, per-job dedup state, and
//! the retry/fallback chain that turns scene text into validated files.

pub mod terms;

use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
};

use tracing::{debug, info, warn};

use crate::{
    error::{ReelError, ReelResult},
    media::validate::validate_media_file,
    scene::Scene,
};

/// Search rounds attempted per scene before falling back to the secondary
/// provider.
pub const MAX_ROUNDS_PER_SCENE: usize = 4;

/// Per-round offset into the variation adjective table. Large enough that
/// round k of scene i never collides with round k of scene i+1.
const VARIATION_STRIDE: usize = 10;

/// Hits requested per primary search; deep enough that per-job dedup rarely
/// exhausts a page.
const PRIMARY_SEARCH_LIMIT: usize = 25;

/// The secondary provider runs generic terms, so a shallow page suffices.
const FALLBACK_SEARCH_LIMIT: usize = 10;

/// One downloadable rendition of a search hit.
#[derive(Clone, Debug)]
pub struct MediaFormat {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// A provider search result: a stable id plus its available renditions keyed
/// by format name ("mp4", "gif", ...).
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub id: String,
    pub formats: BTreeMap<String, MediaFormat>,
}

impl SearchHit {
    /// mp4 beats gif beats whatever else the provider offers: real video
    /// compresses better and loops without palette artifacts.
    pub fn preferred_format(&self) -> Option<(&str, &MediaFormat)> {
        for name in ["mp4", "gif"] {
            if let Some(f) = self.formats.get(name) {
                return Some((name, f));
            }
        }
        self.formats.iter().next().map(|(k, v)| (k.as_str(), v))
    }
}

/// A searchable media source (sticker/GIF/stock APIs). Implementations do the
/// network work; the acquisition chain owns retries and dedup.
pub trait MediaProvider {
    fn name(&self) -> &str;
    fn search(&self, query: &str, limit: usize) -> ReelResult<Vec<SearchHit>>;
    fn download(&self, url: &str) -> ReelResult<Vec<u8>>;
}

/// Per-job dedup state. Ids of everything used *or failed* are recorded so a
/// hit that produced a broken download is never retried, and search terms are
/// never reissued within one job.
#[derive(Debug, Default)]
pub struct AcquisitionState {
    used_ids: HashSet<String>,
    used_terms: HashSet<String>,
}

impl AcquisitionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_used(&self, id: &str) -> bool {
        self.used_ids.contains(id)
    }

    pub fn mark_id(&mut self, id: &str) {
        self.used_ids.insert(id.to_owned());
    }

    /// Returns `false` if the term was already issued this job.
    pub fn claim_term(&mut self, term: &str) -> bool {
        self.used_terms.insert(term.to_lowercase())
    }
}

pub struct Acquirer<'a> {
    primary: &'a dyn MediaProvider,
    secondary: Option<&'a dyn MediaProvider>,
    dest_dir: PathBuf,
    /// Visual style prefix applied to synthesized search terms.
    style: Option<String>,
}

impl<'a> Acquirer<'a> {
    pub fn new(
        primary: &'a dyn MediaProvider,
        secondary: Option<&'a dyn MediaProvider>,
        dest_dir: impl Into<PathBuf>,
        style: Option<String>,
    ) -> Self {
        Self {
            primary,
            secondary,
            dest_dir: dest_dir.into(),
            style,
        }
    }

    /// Acquire media for every scene. Scenes that exhaust every round and
    /// fallback are simply skipped; the composer can cycle the pool or fill
    /// with black.
    pub fn acquire_all(
        &self,
        scenes: &[Scene],
        topic: &str,
        state: &mut AcquisitionState,
    ) -> ReelResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dest_dir).map_err(|e| {
            ReelError::acquisition(format!(
                "create media dir '{}': {e}",
                self.dest_dir.display()
            ))
        })?;

        let mut files = Vec::new();
        for (i, scene) in scenes.iter().enumerate() {
            match self.acquire_for_scene(state, scene, i, topic) {
                Some(path) => files.push(path),
                None => warn!(scene = i, "no usable media found for scene"),
            }
        }
        info!(acquired = files.len(), scenes = scenes.len(), "media acquisition finished");
        Ok(files)
    }

    /// Run the retry chain for one scene: up to [`MAX_ROUNDS_PER_SCENE`]
    /// primary searches with rotating terms, then the secondary provider with
    /// progressively more generic terms.
    pub fn acquire_for_scene(
        &self,
        state: &mut AcquisitionState,
        scene: &Scene,
        scene_index: usize,
        topic: &str,
    ) -> Option<PathBuf> {
        for round in 1..=MAX_ROUNDS_PER_SCENE {
            // The script's explicit term gets exactly one shot, on the first
            // round; after that every term is synthesized fresh.
            let term = match (&scene.search_term, round) {
                (Some(term), 1) => term.clone(),
                _ => terms::synthesize(
                    self.style.as_deref(),
                    &scene.text,
                    topic,
                    scene_index + (round - 1) * VARIATION_STRIDE,
                ),
            };
            if !state.claim_term(&term) {
                debug!(scene = scene_index, term, "term already issued, skipping round");
                continue;
            }
            if let Some(path) =
                self.try_provider(self.primary, state, &term, scene_index, PRIMARY_SEARCH_LIMIT)
            {
                return Some(path);
            }
        }

        let secondary = self.secondary?;
        for term in terms::fallback_terms(self.style.as_deref(), topic) {
            if !state.claim_term(&term) {
                continue;
            }
            if let Some(path) =
                self.try_provider(secondary, state, &term, scene_index, FALLBACK_SEARCH_LIMIT)
            {
                return Some(path);
            }
        }
        None
    }

    /// One search against one provider: take the first unused hit that
    /// downloads and validates; record every failed id so it is never
    /// retried.
    fn try_provider(
        &self,
        provider: &dyn MediaProvider,
        state: &mut AcquisitionState,
        term: &str,
        scene_index: usize,
        limit: usize,
    ) -> Option<PathBuf> {
        let hits = match provider.search(term, limit) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(provider = provider.name(), term, error = %e, "search failed");
                return None;
            }
        };
        debug!(provider = provider.name(), term, hits = hits.len(), "search results");

        for hit in &hits {
            if state.id_used(&hit.id) {
                continue;
            }
            let Some((format, rendition)) = hit.preferred_format() else {
                state.mark_id(&hit.id);
                continue;
            };
            match self.download_hit(provider, &hit.id, format, &rendition.url, scene_index) {
                Ok(path) => {
                    state.mark_id(&hit.id);
                    return Some(path);
                }
                Err(e) => {
                    debug!(id = %hit.id, error = %e, "download rejected");
                    state.mark_id(&hit.id);
                }
            }
        }
        None
    }

    fn download_hit(
        &self,
        provider: &dyn MediaProvider,
        id: &str,
        format: &str,
        url: &str,
        scene_index: usize,
    ) -> ReelResult<PathBuf> {
        let bytes = provider.download(url)?;
        let path = self
            .dest_dir
            .join(format!("scene_{scene_index}_{}.{format}", sanitize_id(id)));
        std::fs::write(&path, &bytes)
            .map_err(|e| ReelError::acquisition(format!("write '{}': {e}", path.display())))?;

        if !validate_media_file(&path) {
            let _ = std::fs::remove_file(&path);
            return Err(ReelError::acquisition(format!(
                "downloaded media failed validation: {url}"
            )));
        }
        Ok(path)
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct StubProvider {
        name: &'static str,
        hits: Vec<SearchHit>,
        searches: RefCell<Vec<String>>,
        payload: Vec<u8>,
    }

    impl StubProvider {
        fn new(name: &'static str, hits: Vec<SearchHit>, payload: Vec<u8>) -> Self {
            Self {
                name,
                hits,
                searches: RefCell::new(Vec::new()),
                payload,
            }
        }
    }

    impl MediaProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn search(&self, query: &str, _limit: usize) -> ReelResult<Vec<SearchHit>> {
            self.searches.borrow_mut().push(query.to_owned());
            Ok(self.hits.clone())
        }

        fn download(&self, _url: &str) -> ReelResult<Vec<u8>> {
            Ok(self.payload.clone())
        }
    }

    fn hit(id: &str, formats: &[&str]) -> SearchHit {
        SearchHit {
            id: id.to_owned(),
            formats: formats
                .iter()
                .map(|f| {
                    (
                        (*f).to_owned(),
                        MediaFormat {
                            url: format!("https://cdn.test/{id}.{f}"),
                            width: 480,
                            height: 480,
                        },
                    )
                })
                .collect(),
        }
    }

    fn png_payload() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(64, 64, image::Rgba([9, 9, 9, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        // Pad past the minimum-size validation threshold.
        while buf.len() < 1200 {
            buf.push(0);
        }
        buf
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reelforge-acquire-{}-{tag}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn prefers_mp4_over_gif() {
        let h = hit("a1", &["gif", "mp4", "webp"]);
        assert_eq!(h.preferred_format().unwrap().0, "mp4");
        let h = hit("a2", &["webp", "gif"]);
        assert_eq!(h.preferred_format().unwrap().0, "gif");
    }

    #[test]
    fn same_hit_is_never_reused_across_scenes() {
        // Payload validates as a PNG even though the url says gif; validation
        // decodes content, not names.
        let provider = StubProvider::new("stub", vec![hit("only.png", &["png"])], png_payload());
        let acq = Acquirer::new(&provider, None, temp_dir("dedup"), None);
        let mut state = AcquisitionState::new();

        let scene = Scene::new("volcano erupts violently");
        let first = acq.acquire_for_scene(&mut state, &scene, 0, "volcanoes");
        assert!(first.is_some());

        // Second scene sees only the already-used id and must come up empty.
        let second = acq.acquire_for_scene(&mut state, &scene, 1, "volcanoes");
        assert!(second.is_none());
    }

    #[test]
    fn explicit_term_is_used_on_first_round_only() {
        let provider = StubProvider::new("stub", vec![], Vec::new());
        let acq = Acquirer::new(&provider, None, temp_dir("terms"), None);
        let mut state = AcquisitionState::new();

        let scene = Scene::with_search_term("lava flows downhill", "lava flow");
        let _ = acq.acquire_for_scene(&mut state, &scene, 0, "volcanoes");

        let searches = provider.searches.borrow();
        assert_eq!(searches[0], "lava flow");
        assert_eq!(searches.len(), MAX_ROUNDS_PER_SCENE);
        assert!(searches[1..].iter().all(|s| s != "lava flow"));
        // Rounds rotate the variation adjective, so no term repeats.
        let unique: HashSet<_> = searches.iter().collect();
        assert_eq!(unique.len(), searches.len());
    }

    #[test]
    fn secondary_provider_gets_generic_terms_after_exhaustion() {
        let primary = StubProvider::new("primary", vec![], Vec::new());
        let secondary =
            StubProvider::new("secondary", vec![hit("s1.png", &["png"])], png_payload());
        let acq = Acquirer::new(
            &primary,
            Some(&secondary),
            temp_dir("fallback"),
            Some("cartoon".to_owned()),
        );
        let mut state = AcquisitionState::new();

        let scene = Scene::new("the senate debates");
        let path = acq.acquire_for_scene(&mut state, &scene, 0, "Ancient Rome");
        assert!(path.is_some());

        let searches = secondary.searches.borrow();
        assert!(searches[0].starts_with("cartoon "));
    }

    #[test]
    fn invalid_download_marks_id_and_moves_on() {
        // First id serves junk bytes; acquisition must burn it and still fail
        // (single hit), leaving no file behind.
        let provider = StubProvider::new("stub", vec![hit("bad.png", &["png"])], vec![0u8; 4096]);
        let dir = temp_dir("invalid");
        let acq = Acquirer::new(&provider, None, dir.clone(), None);
        let mut state = AcquisitionState::new();

        let got = acq.acquire_for_scene(&mut state, &Scene::new("anything here"), 0, "topic");
        assert!(got.is_none());
        assert!(state.id_used("bad.png"));
        assert!(std::fs::read_dir(&dir).unwrap().next().is_none());
    }

    #[test]
    fn id_sanitization_keeps_paths_safe() {
        assert_eq!(sanitize_id("ab/../c d"), "ab____c_d");
    }
}
