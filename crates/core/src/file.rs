//! Files with cached content
//!
//! A [`File`] pairs a [`PathHandle`] with an in-memory copy of its content
//! and a [`Codec`] that turns that content into bytes. Names that are not
//! absolute paths are placed under the date folders of a [`Config`].

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::path::{DecodeErrors, PathHandle, StoragePath, decode_utf8, resolve};

/// What the transfer engine needs from a file
pub trait FileRef: Send + Sync {
    fn path(&self) -> &PathHandle;

    fn name(&self) -> String;

    /// Drop any cached content
    fn clear_content(&mut self);
}

/// Converts file content to and from bytes
pub trait Codec: Send + Sync {
    type Content: Send + Sync;

    fn encode(&self, content: &Self::Content) -> Result<Vec<u8>>;

    fn decode(&self, bytes: Vec<u8>) -> Result<Self::Content>;
}

/// UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec {
    pub errors: DecodeErrors,
}

impl Codec for TextCodec {
    type Content = String;

    fn encode(&self, content: &String) -> Result<Vec<u8>> {
        Ok(content.as_bytes().to_vec())
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<String> {
        decode_utf8(bytes, self.errors)
    }
}

/// Raw bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    type Content = Vec<u8>;

    fn encode(&self, content: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(content.clone())
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(bytes)
    }
}

/// A JSON document deserialized into `T`
pub struct JsonCodec<T> {
    pub pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            pretty: false,
            _marker: PhantomData,
        }
    }

    pub fn pretty() -> Self {
        Self {
            pretty: true,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self {
            pretty: self.pretty,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Content = T;

    fn encode(&self, content: &T) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(content)
        } else {
            serde_json::to_vec(content)
        };
        encoded.map_err(|e| Error::Encoding(e.to_string()))
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<T> {
        serde_json::from_slice(&bytes).map_err(|e| Error::Encoding(e.to_string()))
    }
}

pub type TextFile = File<TextCodec>;
pub type BytesFile = File<BytesCodec>;
pub type JsonFile<T> = File<JsonCodec<T>>;

/// A file on any backend with cached content
pub struct File<C: Codec> {
    path: PathHandle,
    name: String,
    subdir: String,
    content: Option<C::Content>,
    codec: C,
}

impl<C: Codec> File<C> {
    /// Wrap `path`. An absolute path is used as is; a relative one is a
    /// name placed under `subdir` in the storage folders of `config`.
    pub fn new(config: &Config, path: PathHandle, subdir: &str, codec: C) -> Self {
        if path.is_absolute() {
            return Self {
                name: path.name(),
                path,
                subdir: String::new(),
                content: None,
                codec,
            };
        }

        let name = path.to_string();
        Self {
            path: config.file_storage_path(&name, subdir),
            name,
            subdir: subdir.to_string(),
            content: None,
            codec,
        }
    }

    /// Like [`File::new`], resolving `path_or_name` first
    pub fn open(config: &Config, path_or_name: &str, subdir: &str, codec: C) -> Result<Self> {
        Ok(Self::new(config, resolve(path_or_name)?, subdir, codec))
    }

    pub fn with_content(mut self, content: C::Content) -> Self {
        self.content = Some(content);
        self
    }

    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    pub fn content(&self) -> Option<&C::Content> {
        self.content.as_ref()
    }

    /// Write the content, replacing the cached content with `content` when
    /// given. Parent directories are created first.
    pub async fn save(&mut self, content: Option<C::Content>, clear_content: bool) -> Result<()> {
        if let Some(content) = content {
            self.content = Some(content);
        }
        let Some(content) = &self.content else {
            return Err(Error::General(format!(
                "Content of {} not set. Provide content or read the file first.",
                self.name
            )));
        };

        self.path.parent().make_dirs(true).await?;
        tracing::info!(name = %self.name, path = %self.path, "Saving file");
        let data = self.codec.encode(content)?;
        self.path.write_bytes(&data).await?;

        if clear_content {
            FileRef::clear_content(self);
        }
        Ok(())
    }

    /// Read the content, returning the cached copy when `use_cache` is set
    /// and one exists
    pub async fn read(&mut self, use_cache: bool) -> Result<&C::Content> {
        if !use_cache || self.content.is_none() {
            tracing::info!(name = %self.name, path = %self.path, "Reading file");
            let bytes = self.path.read_bytes().await?;
            let content = self.codec.decode(bytes)?;
            return Ok(self.content.insert(content));
        }

        tracing::debug!(name = %self.name, "Returning cached content");
        self.content
            .as_ref()
            .ok_or_else(|| Error::General(format!("Content of {} not loaded", self.name)))
    }
}

impl<C: Codec> FileRef for File<C> {
    fn path(&self) -> &PathHandle {
        &self.path
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn clear_content(&mut self) {
        tracing::debug!(name = %self.name, "Clearing cached content");
        self.content = None;
    }
}

impl<C: Codec> fmt::Debug for File<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("loaded", &self.content.is_some())
            .finish()
    }
}
