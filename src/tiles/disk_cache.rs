use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::{
    core::tile_key::TileKey,
    data::{heightfield::HeightField, image::GeoImage},
    tiles::cache::{Cache, HEIGHTFIELD_FORMAT},
    traits::{CacheCounters, CacheStats},
    Error, Result,
};

/// File-system cache laid out as `<root>/<layer>/<level>/<x>/<y>.<format>`.
///
/// Images are stored as PNG regardless of the requested format tag; the tag
/// only selects the file name. Heightfields are bincode-encoded.
#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    counters: CacheCounters,
}

impl DiskCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            counters: CacheCounters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tile_path(&self, key: &TileKey, layer_name: &str, format: &str) -> PathBuf {
        self.root
            .join(sanitize(layer_name))
            .join(key.level().to_string())
            .join(key.x().to_string())
            .join(format!("{}.{}", key.y(), sanitize(format)))
    }

    fn prepare(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Writes through a sibling temp file so `path` only ever holds a
    /// complete entry.
    fn write_atomically<F>(path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        Self::prepare(path)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".partial");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = write(&tmp).and_then(|()| fs::rename(&tmp, path).map_err(Error::from)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    fn read_image(&self, path: &Path, key: &TileKey) -> Result<GeoImage> {
        let reader = BufReader::new(File::open(path)?);
        let image = image::load(reader, ImageFormat::Png)?.to_rgba8();
        Ok(GeoImage::new(image, key.extent()))
    }

    fn read_heightfield(&self, path: &Path) -> Result<HeightField> {
        let reader = BufReader::new(File::open(path)?);
        let hf: HeightField = bincode::deserialize_from(reader)?;
        if !hf.is_well_formed() {
            return Err(Error::Cache(format!(
                "{}x{} heightfield with a mismatched sample count",
                hf.num_columns(),
                hf.num_rows()
            )));
        }
        Ok(hf)
    }
}

impl Cache for DiskCache {
    fn is_cached(&self, key: &TileKey, layer_name: &str, format: &str) -> bool {
        self.tile_path(key, layer_name, format).is_file()
    }

    fn get_image(&self, key: &TileKey, layer_name: &str, format: &str) -> Option<GeoImage> {
        let path = self.tile_path(key, layer_name, format);
        if !path.is_file() {
            return self.counters.record(None);
        }
        match self.read_image(&path, key) {
            Ok(image) => self.counters.record(Some(image)),
            Err(e) => {
                log::warn!("dropping unreadable cached image {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                self.counters.record(None)
            }
        }
    }

    fn put_image(&self, key: &TileKey, layer_name: &str, format: &str, image: &GeoImage) -> Result<()> {
        let path = self.tile_path(key, layer_name, format);
        Self::write_atomically(&path, |tmp| Ok(image.image().save_with_format(tmp, ImageFormat::Png)?))?;
        log::debug!("cached image {} for layer '{}'", key, layer_name);
        Ok(())
    }

    fn get_heightfield(&self, key: &TileKey, layer_name: &str) -> Option<HeightField> {
        let path = self.tile_path(key, layer_name, HEIGHTFIELD_FORMAT);
        if !path.is_file() {
            return self.counters.record(None);
        }
        match self.read_heightfield(&path) {
            Ok(hf) => self.counters.record(Some(hf)),
            Err(e) => {
                log::warn!("dropping unreadable cached heightfield {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                self.counters.record(None)
            }
        }
    }

    fn put_heightfield(&self, key: &TileKey, layer_name: &str, heightfield: &HeightField) -> Result<()> {
        let path = self.tile_path(key, layer_name, HEIGHTFIELD_FORMAT);
        Self::write_atomically(&path, |tmp| {
            let mut writer = BufWriter::new(File::create(tmp)?);
            bincode::serialize_into(&mut writer, heightfield)?;
            writer.flush()?;
            Ok(())
        })?;
        log::debug!("cached heightfield {} for layer '{}'", key, layer_name);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(0)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
