use std::path::PathBuf;

use anyhow::{Result, bail};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use efc_db::models::StoredAsset;
use efc_types::models::{AssetKind, AssetRef};

/// Chapter videos and outlines on local disk.
///
/// Each kind lives in its own subdirectory: `{storage_dir}/videos/{name}.mp4`
/// and `{storage_dir}/outlines/{name}.pdf`.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        for kind in [AssetKind::Video, AssetKind::Outline] {
            fs::create_dir_all(dir.join(kind.dir())).await?;
        }
        info!("Asset storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Stored filename for a chapter's asset: course name, chapter position
    /// and chapter name, reduced to `[A-Za-z0-9_-]`.
    pub fn derive_name(course_name: &str, chapter_index: i64, chapter_name: &str, kind: AssetKind) -> String {
        format!(
            "{}_{}_{}.{}",
            sanitize(course_name),
            chapter_index,
            sanitize(chapter_name),
            kind.extension()
        )
    }

    /// The derived name, then the same name tagged with the chapter id for
    /// when another chapter already holds the first one. Renumbering can hand
    /// a chapter a position whose derived name an older upload still uses.
    pub fn name_candidates(
        course_name: &str,
        chapter_index: i64,
        chapter_name: &str,
        chapter_id: i64,
        kind: AssetKind,
    ) -> [String; 2] {
        let base = Self::derive_name(course_name, chapter_index, chapter_name, kind);
        let tagged = format!(
            "{}_{}_{}_c{}.{}",
            sanitize(course_name),
            chapter_index,
            sanitize(chapter_name),
            chapter_id,
            kind.extension()
        );
        [base, tagged]
    }

    /// On-disk path, or `None` for names that could leave the kind's directory.
    pub fn path(&self, kind: AssetKind, filename: &str) -> Option<PathBuf> {
        let valid = !filename.is_empty()
            && !filename.starts_with('.')
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        valid.then(|| self.dir.join(kind.dir()).join(filename))
    }

    pub async fn exists(&self, kind: AssetKind, filename: &str) -> bool {
        match self.path(kind, filename) {
            Some(path) => fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Writes `data` under `filename`, replacing any file already there.
    /// Readers never observe a half-written file.
    pub async fn save(&self, kind: AssetKind, filename: &str, data: &[u8]) -> Result<u64> {
        let Some(path) = self.path(kind, filename) else {
            bail!("invalid asset filename '{}'", filename);
        };
        let partial = self.dir.join(kind.dir()).join(format!(".{}.part", Uuid::new_v4()));

        let mut file = fs::File::create(&partial).await?;
        if let Err(e) = file.write_all(data).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        file.flush().await?;
        drop(file);
        fs::rename(&partial, &path).await?;

        info!("Stored {} ({} bytes)", path.display(), data.len());
        Ok(data.len() as u64)
    }

    pub async fn read(&self, kind: AssetKind, filename: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.path(kind, filename) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a stored asset. A file that is already gone is not an error.
    pub async fn delete(&self, kind: AssetKind, filename: &str) -> Result<()> {
        let Some(path) = self.path(kind, filename) else {
            warn!("Refusing to delete invalid asset filename '{}'", filename);
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted asset {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Asset {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of the files left behind by deleted chapters.
    pub async fn delete_all(&self, assets: &[StoredAsset]) {
        for asset in assets {
            if let Err(e) = self.delete(asset.kind, &asset.filename).await {
                warn!("Failed to delete asset {}: {}", asset.filename, e);
            }
        }
    }

    pub fn url(kind: AssetKind, filename: &str) -> String {
        format!("/assets/{}/{}", kind.dir(), filename)
    }

    /// A retrievable reference when the stored name points at a file that
    /// exists right now, otherwise `Unavailable`.
    pub async fn resolve(&self, kind: AssetKind, filename: Option<&str>) -> AssetRef {
        match filename {
            Some(name) if self.exists(kind, name).await => AssetRef::Available {
                url: Self::url(kind, name),
            },
            _ => AssetRef::Unavailable,
        }
    }
}

fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect()
}
