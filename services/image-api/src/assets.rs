//! Fonts, bitmaps and directory listings read from disk once and kept for the life
//! of the process.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use card_common::{CardError, CardResult};
use renderer::{codec, text, Font, Pixmap};
use storage::{CachePolicy, CacheStatsSnapshot, CachedHandle, NamedLock, ResourceCache};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::run_blocking;

/// Asset locations. `{}` is replaced by a request value.
pub mod paths {
    // Relative to the assets directory
    pub const DISPLAY_FONT: &str = "Fonts/Fortnite.ttf";
    pub const PLAIN_FONT: &str = "Fonts/Segoe.ttf";
    pub const VBUCKS_ICON: &str = "Images/Shop/vbucks_icon.png";
    pub const AD_BANNER: &str = "Images/Shop/ad_banner.png";
    pub const DISCORD_LOGO: &str = "Images/DiscordLogo.png";
    pub const VERIFIED_ICON: &str = "Images/Stats/Verified.png";
    pub const BUILD_LOGO: &str = "Images/Stats/BuildLogo.png";
    pub const ZERO_BUILD_LOGO: &str = "Images/Stats/ZeroBuildLogo.png";
    pub const PLAYLIST_ICON: &str = "Images/Stats/PlaylistIcons/{}.png";
    pub const INPUT_ICON: &str = "Images/Stats/InputTypes/{}.png";
    pub const DIVISION_ICON: &str = "Images/Stats/DivisionIcons/{}.png";
    pub const RARITY_BACKGROUND: &str = "Images/Locker/RarityBackgrounds/{}.png";
    pub const SOURCE_ICON: &str = "Images/Locker/Source/{}.png";
    pub const MAP_MARKERS: &str = "Images/Map/Markers";

    // Relative to the data directory
    pub const CUSTOM_BACKGROUND: &str = "images/{}";
    pub const MAP: &str = "images/map/{}.png";
}

pub struct SharedAssets {
    assets_dir: PathBuf,
    data_dir: PathBuf,
    bitmaps: ResourceCache<Pixmap>,
    fonts: ResourceCache<Font<'static>>,
    /// File counts per directory and extension.
    listings: ResourceCache<usize>,
}

impl SharedAssets {
    pub fn new(locks: Arc<NamedLock>, assets_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            assets_dir,
            data_dir,
            bitmaps: ResourceCache::new("bmp", locks.clone()),
            fonts: ResourceCache::new("font", locks.clone()),
            listings: ResourceCache::new("listing", locks),
        }
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Bundled bitmap `name` under the assets directory.
    pub async fn asset(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> CardResult<Option<CachedHandle<Pixmap>>> {
        self.get_bitmap(&self.assets_dir.join(name), cancel).await
    }

    /// Bundled bitmap for a templated `format` such as [`paths::INPUT_ICON`].
    pub async fn asset_fmt(
        &self,
        format: &str,
        arg: Option<&str>,
        cancel: &CancellationToken,
    ) -> CardResult<Option<CachedHandle<Pixmap>>> {
        let format = self.assets_dir.join(format);
        self.get_bitmap_fmt(&format.to_string_lossy(), arg, cancel).await
    }

    /// Deployment bitmap (custom background, map) for a templated `format`.
    pub async fn data_fmt(
        &self,
        format: &str,
        arg: Option<&str>,
        cancel: &CancellationToken,
    ) -> CardResult<Option<CachedHandle<Pixmap>>> {
        let format = self.data_dir.join(format);
        self.get_bitmap_fmt(&format.to_string_lossy(), arg, cancel).await
    }

    /// Bundled font `name` under the assets directory.
    pub async fn font(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> CardResult<CachedHandle<Font<'static>>> {
        self.get_font(&self.assets_dir.join(name), cancel).await
    }

    /// Decoded bitmap at `path`, or `None` when the file does not exist.
    ///
    /// Missing files are remembered too, so a missing optional asset costs one
    /// filesystem lookup per process.
    pub async fn get_bitmap(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> CardResult<Option<CachedHandle<Pixmap>>> {
        let key = path.to_string_lossy();
        self.bitmaps
            .get_or_load(&key, CachePolicy::never_evict(), cancel, || async {
                let Some(bytes) = read_optional(path).await? else {
                    debug!(path = %path.display(), "Bitmap asset not found");
                    return Ok(None);
                };
                let bitmap = run_blocking(move || codec::decode(&bytes)).await?;
                Ok::<_, CardError>(Some(bitmap))
            })
            .await
    }

    /// [`get_bitmap`](Self::get_bitmap) on `format` with `{}` replaced by `arg`.
    /// `None` when there is no `arg`.
    pub async fn get_bitmap_fmt(
        &self,
        format: &str,
        arg: Option<&str>,
        cancel: &CancellationToken,
    ) -> CardResult<Option<CachedHandle<Pixmap>>> {
        let Some(arg) = arg else {
            return Ok(None);
        };
        if arg.split(['/', '\\']).any(|part| part == "..") {
            warn!(arg = arg, "Rejecting asset path outside the asset root");
            return Ok(None);
        }
        let path = format.replacen("{}", arg, 1);
        self.get_bitmap(Path::new(&path), cancel).await
    }

    /// Parsed font at `path`. A missing font is an error, not an absent value.
    pub async fn get_font(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> CardResult<CachedHandle<Font<'static>>> {
        let key = path.to_string_lossy();
        let policy = CachePolicy::never_evict().cache_not_found(false);
        let font = self
            .fonts
            .get_or_load(&key, policy, cancel, || async {
                match read_optional(path).await? {
                    Some(bytes) => text::load_font(bytes).map(Some),
                    None => Ok(None),
                }
            })
            .await?;
        font.ok_or_else(|| CardError::NotFound(format!("Font {}", path.display())))
    }

    /// Number of `*.{extension}` files in `dir` under the assets directory.
    /// A missing directory has none.
    pub async fn file_count(
        &self,
        dir: &str,
        extension: &str,
        cancel: &CancellationToken,
    ) -> CardResult<usize> {
        let dir = self.assets_dir.join(dir);
        let key = format!("{}/*.{}", dir.to_string_lossy(), extension);
        let count = self
            .listings
            .get_or_load(&key, CachePolicy::never_evict(), cancel, || async {
                count_files(&dir, extension).await.map(Some)
            })
            .await?;
        Ok(count.map_or(0, |count| *count))
    }

    /// Forget everything; the next request reads from disk again.
    pub async fn clear(&self) -> usize {
        self.bitmaps.clear().await + self.fonts.clear().await + self.listings.clear().await
    }

    pub fn stats(&self) -> Vec<CacheStatsSnapshot> {
        vec![self.bitmaps.stats(), self.fonts.stats(), self.listings.stats()]
    }
}

async fn count_files(dir: &Path, extension: &str) -> CardResult<usize> {
    let list_failed = |e: io::Error| CardError::LoadFailed {
        key: dir.display().to_string(),
        message: e.to_string(),
    };
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(list_failed(e)),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await.map_err(list_failed)? {
        if entry.path().extension().is_some_and(|ext| ext == extension) {
            count += 1;
        }
    }
    debug!(dir = %dir.display(), extension = extension, count = count, "Counted asset files");
    Ok(count)
}

async fn read_optional(path: &Path) -> CardResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CardError::LoadFailed {
            key: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_common::Rgba;
    use renderer::canvas;

    fn write_png(dir: &Path, name: &str) {
        let mut pixmap = canvas::new_pixmap(4, 3).unwrap();
        pixmap.fill(canvas::to_color(Rgba::rgb(255, 0, 0)));
        std::fs::write(dir.join(name), codec::encode_png(&pixmap).unwrap()).unwrap();
    }

    fn assets_in(dir: &Path) -> SharedAssets {
        SharedAssets::new(Arc::new(NamedLock::default()), dir.to_path_buf(), dir.join("data"))
    }

    #[tokio::test]
    async fn test_bitmap_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "icon.png");
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();

        let path = dir.path().join("icon.png");
        let first = assets.get_bitmap(&path, &cancel).await.unwrap().unwrap();
        let second = assets.get_bitmap(&path, &cancel).await.unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (4, 3));

        let stats = &assets.stats()[0];
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 1);
        drop((first, second));
    }

    #[tokio::test]
    async fn test_file_count_is_listed_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Markers")).unwrap();
        for name in ["0.png", "1.png", "notes.txt"] {
            std::fs::write(dir.path().join("Markers").join(name), b"x").unwrap();
        }
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();

        assert_eq!(assets.file_count("Markers", "png", &cancel).await.unwrap(), 2);
        std::fs::write(dir.path().join("Markers/2.png"), b"x").unwrap();
        assert_eq!(assets.file_count("Markers", "png", &cancel).await.unwrap(), 2);
        assert_eq!(assets.file_count("Missing", "png", &cancel).await.unwrap(), 0);

        let stats = &assets.stats()[2];
        assert_eq!(stats.name, "listing");
        assert_eq!(stats.loads, 2);
        assert_eq!(stats.hits, 1);

        // Clearing picks up the new file
        assets.clear().await;
        assert_eq!(assets.file_count("Markers", "png", &cancel).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_bitmap_is_cached_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();

        let path = dir.path().join("missing.png");
        assert!(assets.get_bitmap(&path, &cancel).await.unwrap().is_none());

        // Appearing later does not matter, the absence is remembered
        write_png(dir.path(), "missing.png");
        assert!(assets.get_bitmap(&path, &cancel).await.unwrap().is_none());
        assert_eq!(assets.stats()[0].not_found_entries, 1);
    }

    #[tokio::test]
    async fn test_bitmap_fmt() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "bg.png");
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();
        let format = dir.path().join("{}").to_string_lossy().into_owned();

        assert!(assets.get_bitmap_fmt(&format, None, &cancel).await.unwrap().is_none());
        assert!(assets
            .get_bitmap_fmt(&format, Some("bg.png"), &cancel)
            .await
            .unwrap()
            .is_some());
        assert!(assets
            .get_bitmap_fmt(&format, Some("../etc/passwd"), &cancel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_relative_lookups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Icons")).unwrap();
        std::fs::create_dir_all(dir.path().join("data/images")).unwrap();
        write_png(&dir.path().join("Icons"), "PC.png");
        write_png(&dir.path().join("data/images"), "custom.png");
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();

        assert!(assets.asset("Icons/PC.png", &cancel).await.unwrap().is_some());
        assert!(assets.asset_fmt("Icons/{}.png", Some("PC"), &cancel).await.unwrap().is_some());
        assert!(assets.asset_fmt("Icons/{}.png", Some("Xbox"), &cancel).await.unwrap().is_none());
        assert!(assets
            .data_fmt(paths::CUSTOM_BACKGROUND, Some("custom.png"), &cancel)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_fonts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plain.ttf"), text::FALLBACK_FONT_DATA).unwrap();
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();

        let font = assets.get_font(&dir.path().join("plain.ttf"), &cancel).await.unwrap();
        assert!(text::measure_text(&font, 20.0, "abc").width > 0.0);

        let missing = assets.get_font(&dir.path().join("nope.ttf"), &cancel).await;
        assert!(matches!(missing, Err(CardError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_bitmap_is_an_error_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.png"), b"garbage").unwrap();
        let assets = assets_in(dir.path());
        let cancel = CancellationToken::new();

        let path = dir.path().join("bad.png");
        assert!(matches!(
            assets.get_bitmap(&path, &cancel).await,
            Err(CardError::DecodeFailed(_))
        ));
        assert_eq!(assets.stats()[0].entries, 0);
    }
}
