use crate::config::UploadConfig;
use crate::errors::{bad_request, ApiError, ApiResult};
use anyhow::{anyhow, Context, Result};
use axum::extract::multipart::{Field, MultipartError};
use chrono::Local;
use exif::{In, Reader, Tag};
use futures_util::TryStreamExt;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::{debug, error};
use uuid::Uuid;

/// Display width every stored avatar is resized to.
pub const AVATAR_WIDTH: u32 = 400;

lazy_static! {
    static ref INVALID_CHARS: Regex = Regex::new(r"[^\w\-.一-龥]+").unwrap();
}

/// An uploaded image saved under the upload root.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAvatar {
    /// Location on disk
    pub path: PathBuf,
    /// Path relative to the upload root, as stored in `articles.avatar`
    pub name: String,
}

impl StoredAvatar {
    /// Removes the file, logging instead of failing when it is already gone.
    pub async fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.path).await {
            error!("Cannot remove avatar {}: {}", self.path.display(), e);
        }
    }
}

pub struct AvatarService {
    config: UploadConfig,
}

impl AvatarService {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Streams a multipart file field to `<upload root>/article/<yyyymmdd>/<secure name>`.
    pub async fn stream_to_file(&self, field: Field<'_>) -> ApiResult<StoredAvatar> {
        let file_name = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .ok_or(bad_request("Invalid filename"))?
            .to_owned();
        let content_type = field
            .content_type()
            .ok_or(bad_request("Invalid file type"))?
            .to_owned();

        if !self.is_image(&content_type) {
            return Err(bad_request("Avatar must be an image"));
        }

        let dir = format!("article/{}", Local::now().format("%Y%m%d"));
        let name = format!("{}/{}", dir, generate_secure_filename(&file_name, 8));
        let upload_dir = Path::new(&self.config.base_path).join(&dir);
        fs::create_dir_all(&upload_dir)
            .await
            .context("Cannot create upload directory")?;

        let path = Path::new(&self.config.base_path).join(&name);

        // Convert the stream into an `AsyncRead`.
        let body_with_io_error = field.map_err(io::Error::other);
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let file = File::create(&path).await.context("Cannot create file")?;
        let mut buf_writer = BufWriter::new(file);

        let copied = tokio::io::copy(&mut body_reader, &mut buf_writer).await;
        let flushed = match copied {
            Ok(_) => buf_writer.flush().await,
            Err(err) => Err(err),
        };

        if let Err(err) = flushed {
            fs::remove_file(&path)
                .await
                .map_err(|e| error!("Cannot remove file: {}", e))
                .ok();

            return Err(match err.downcast::<MultipartError>() {
                Ok(err) => ApiError::MultiPartError(err),
                Err(_) => ApiError::Anyhow(anyhow!("cannot save file")),
            });
        }

        debug!("avatar stored at {}", path.display());
        Ok(StoredAvatar { path, name })
    }

    /// Resizes a stored avatar in place. Image work runs on the blocking pool.
    pub async fn process(&self, avatar: &StoredAvatar) -> Result<()> {
        let path = avatar.path.clone();
        tokio::task::spawn_blocking(move || AvatarProcessor::process(&path))
            .await
            .context("Avatar processing task failed")?
    }

    /// Absolute file path of a stored avatar name.
    pub fn path_of(&self, name: &str) -> PathBuf {
        Path::new(&self.config.base_path).join(name)
    }

    fn is_image(&self, content_type: &str) -> bool {
        let format = content_type
            .strip_prefix("image/")
            .unwrap_or("")
            .to_lowercase();
        self.config.image_formats.contains(&format)
    }
}

/// Resizes images to the fixed avatar width, keeping the aspect ratio.
pub struct AvatarProcessor;

impl AvatarProcessor {
    /// Opens `path`, resizes it to `AVATAR_WIDTH` wide and overwrites the file
    /// in its original format.
    pub fn process(path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).context("Cannot open image")?;

        let reader = ImageReader::new(Cursor::new(&bytes)).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| anyhow!("Unknown image format"))?;
        let mut img = reader.decode().context("Cannot decode image")?;

        if format == ImageFormat::Jpeg {
            img = apply_exif_orientation(&bytes, img);
        }

        let resized = Self::resize(&img);
        resized
            .save_with_format(path, format)
            .context("Cannot save resized image")?;

        debug!(
            "avatar resized from {}x{} to {}x{}",
            img.width(),
            img.height(),
            resized.width(),
            resized.height()
        );
        Ok(())
    }

    pub fn resize(img: &DynamicImage) -> DynamicImage {
        let height = scaled_height(img.width(), img.height());
        img.resize_exact(AVATAR_WIDTH, height, FilterType::Lanczos3)
    }
}

/// `round(AVATAR_WIDTH * height / width)`, never less than one pixel.
pub fn scaled_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = (AVATAR_WIDTH as f64 * height as f64 / width as f64).round();
    scaled.max(1.0) as u32
}

fn apply_exif_orientation(bytes: &[u8], img: DynamicImage) -> DynamicImage {
    let mut reader = BufReader::new(Cursor::new(bytes));
    let orientation = Reader::new()
        .read_from_container(&mut reader)
        .ok()
        .and_then(|exif| {
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        });

    match orientation {
        Some(6) => img.rotate90(),
        Some(3) => img.rotate180(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}

/// Generates a secure filename by sanitizing the input filename and appending a UUID.
///
/// # Arguments
/// * `filename` - The original filename to be sanitized.
/// * `uuid_length` - The length of the UUID to be appended (clamped to 8..=32).
///
/// # Returns
/// A `String` in the format `basename.uuid` or `basename.uuid.extension`.
pub fn generate_secure_filename(filename: &str, uuid_length: usize) -> String {
    let uuid_length = uuid_length.clamp(8, 32);

    // Only the last path component of the client supplied name is kept
    let filename = filename.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let sanitized_name = INVALID_CHARS.replace_all(filename, "_");
    let sanitized_name = if sanitized_name.is_empty() || sanitized_name == "." {
        "file".into()
    } else {
        sanitized_name
    };

    let (base, ext) = split_filename(&sanitized_name);

    let uuid = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(uuid_length)
        .collect::<String>();

    if ext.is_empty() {
        format!("{}.{}", base, uuid)
    } else {
        format!("{}.{}.{}", base, uuid, ext)
    }
}

/// Splits a filename into its base name and lower-cased extension.
/// A leading dot belongs to the base name, so `.foo` has no extension.
pub fn split_filename(filename: &str) -> (String, String) {
    let (prefix, rest) = match filename.strip_prefix('.') {
        Some(remainder) => (".", remainder),
        None => ("", filename),
    };

    match rest.rfind('.') {
        Some(i) => (
            format!("{}{}", prefix, &rest[..i]),
            rest[i + 1..].to_lowercase(),
        ),
        None => (filename.to_string(), String::new()),
    }
}
