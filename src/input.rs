use crate::error::{MissingInput, OculusError, Result};
use crate::request::AnalysisRequest;

/// Image formats accepted at the upload boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Returns the MIME type used in the data URI.
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    /// Maps a MIME type to a format. Only `image/jpeg` and `image/png` are accepted.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    /// Maps a file name or bare extension to a format.
    pub fn from_extension(name: &str) -> Option<Self> {
        let extension = name.rsplit('.').next()?.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    /// Detects the format from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
        const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

        if bytes.starts_with(PNG_MAGIC) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }
}

/// An uploaded image, kept as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    /// File name as given by the user.
    pub name: String,
    /// Format used for the data URI.
    pub format: ImageFormat,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Creates an upload from bytes whose format is already known.
    pub fn new(name: impl Into<String>, format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Validates an upload at the file boundary.
    ///
    /// A declared MIME type must be on the allow-list. Without one, the file
    /// name and then the leading bytes decide the format.
    ///
    /// # Arguments
    /// * `name` - The uploaded file name
    /// * `mime` - The declared content type, if the client sent one
    /// * `bytes` - The file contents
    ///
    /// # Returns
    /// The upload, or [`OculusError::UnsupportedFormat`] for any other format
    pub fn from_upload(name: &str, mime: Option<&str>, bytes: Vec<u8>) -> Result<Self> {
        let format = match mime.filter(|m| !m.trim().is_empty()) {
            Some(mime) => ImageFormat::from_mime(mime)
                .ok_or_else(|| OculusError::UnsupportedFormat(mime.to_string()))?,
            None => ImageFormat::from_extension(name)
                .or_else(|| ImageFormat::sniff(&bytes))
                .ok_or_else(|| OculusError::UnsupportedFormat(name.to_string()))?,
        };

        Ok(Self::new(name, format, bytes))
    }
}

/// Secret used to authenticate against the provider.
///
/// Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for a blank value.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the secret value, for the authorization header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(****)")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("****")
    }
}

/// Gathers the inputs of one analysis and decides whether it can be submitted.
#[derive(Clone, Debug, Default)]
pub struct InputCollector {
    image: Option<ImageUpload>,
    context_enabled: bool,
    context: String,
    credential: Option<Credential>,
}

impl InputCollector {
    /// Creates an empty collector with the context toggle off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image to analyze, replacing any previous one.
    pub fn set_image(&mut self, image: ImageUpload) -> &mut Self {
        self.image = Some(image);
        self
    }

    /// Removes the image.
    pub fn clear_image(&mut self) -> &mut Self {
        self.image = None;
        self
    }

    /// Opts in or out of sending the context text.
    pub fn set_context_enabled(&mut self, enabled: bool) -> &mut Self {
        self.context_enabled = enabled;
        self
    }

    /// Sets the context text. It is only sent while the toggle is on.
    pub fn set_context(&mut self, context: impl Into<String>) -> &mut Self {
        self.context = context.into();
        self
    }

    /// Replaces the credential. A blank value clears it.
    pub fn set_credential(&mut self, credential: impl Into<String>) -> &mut Self {
        self.credential = Credential::new(credential);
        self
    }

    /// Returns the current image, if any.
    pub fn image(&self) -> Option<&ImageUpload> {
        self.image.as_ref()
    }

    /// The context that would be sent, honoring the opt-in toggle.
    pub fn context(&self) -> Option<&str> {
        if self.context_enabled && !self.context.trim().is_empty() {
            Some(&self.context)
        } else {
            None
        }
    }

    /// Returns true when both an image and a credential are present.
    pub fn is_ready(&self) -> bool {
        self.image.is_some() && self.credential.is_some()
    }

    /// Notice shown before submission while no credential is set.
    pub fn credential_hint(&self) -> Option<&'static str> {
        if self.credential.is_none() {
            Some("Enter your key before continuing with the analysis.")
        } else {
            None
        }
    }

    /// Builds the request for one submission. The collector itself is left
    /// unchanged so the same inputs can be submitted again.
    pub fn submit(&self) -> Result<AnalysisRequest> {
        let image = self
            .image
            .clone()
            .ok_or(OculusError::MissingInput(MissingInput::Image))?;
        let credential = self
            .credential
            .clone()
            .ok_or(OculusError::MissingInput(MissingInput::Credential))?;

        Ok(AnalysisRequest::new(
            image,
            self.context().map(str::to_string),
            credential,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn jpeg() -> ImageUpload {
        ImageUpload::new("red.jpg", ImageFormat::Jpeg, JPEG_BYTES.to_vec())
    }

    #[test]
    fn format_detection() {
        assert_eq!(ImageFormat::from_mime("image/png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_mime("IMAGE/JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime("image/gif"), None);
        assert_eq!(ImageFormat::from_extension("photo.JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("photo.jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("photo.webp"), None);
        assert_eq!(ImageFormat::sniff(JPEG_BYTES), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"\x89PNG\r\n\x1a\n...."), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
    }

    #[test]
    fn upload_rejects_unsupported_formats() {
        let err = ImageUpload::from_upload("anim.gif", Some("image/gif"), b"GIF89a".to_vec())
            .unwrap_err();
        assert!(matches!(err, OculusError::UnsupportedFormat(ref m) if m == "image/gif"));

        let upload = ImageUpload::from_upload("blob", None, JPEG_BYTES.to_vec()).unwrap();
        assert_eq!(upload.format, ImageFormat::Jpeg);
    }

    #[test]
    fn declared_mime_must_be_allowed() {
        let err = ImageUpload::from_upload("photo.png", Some("image/gif"), JPEG_BYTES.to_vec())
            .unwrap_err();
        assert!(matches!(err, OculusError::UnsupportedFormat(ref m) if m == "image/gif"));

        let upload =
            ImageUpload::from_upload("photo.bin", Some("image/png"), JPEG_BYTES.to_vec()).unwrap();
        assert_eq!(upload.format, ImageFormat::Png);

        let upload = ImageUpload::from_upload("photo.png", Some(""), JPEG_BYTES.to_vec()).unwrap();
        assert_eq!(upload.format, ImageFormat::Png);

        let err = ImageUpload::from_upload("notes.txt", None, b"plain".to_vec()).unwrap_err();
        assert!(matches!(err, OculusError::UnsupportedFormat(ref m) if m == "notes.txt"));
    }

    #[test]
    fn credential_is_redacted() {
        let credential = Credential::new("sk-secret").unwrap();
        assert_eq!(format!("{credential:?}"), "Credential(****)");
        assert_eq!(credential.to_string(), "****");
        assert_eq!(credential.expose(), "sk-secret");
        assert!(Credential::new("  ").is_none());
    }

    #[test]
    fn missing_image_is_reported_first() {
        let collector = InputCollector::new();
        assert!(!collector.is_ready());
        let err = collector.submit().unwrap_err();
        assert!(matches!(err, OculusError::MissingInput(MissingInput::Image)));
        assert!(err.is_warning());
    }

    #[test]
    fn missing_credential_is_a_warning() {
        let mut collector = InputCollector::new();
        collector.set_image(jpeg());
        assert!(!collector.is_ready());
        assert_eq!(
            collector.credential_hint(),
            Some("Enter your key before continuing with the analysis.")
        );
        let err = collector.submit().unwrap_err();
        assert!(matches!(err, OculusError::MissingInput(MissingInput::Credential)));
    }

    #[test]
    fn context_requires_opt_in() {
        let mut collector = InputCollector::new();
        collector
            .set_image(jpeg())
            .set_credential("sk-test")
            .set_context("taken at night");
        assert!(collector.is_ready());
        assert_eq!(collector.submit().unwrap().context(), None);

        collector.set_context_enabled(true);
        assert_eq!(collector.submit().unwrap().context(), Some("taken at night"));

        collector.set_context("");
        assert_eq!(collector.submit().unwrap().context(), None);
    }

    #[test]
    fn blank_credential_clears_it() {
        let mut collector = InputCollector::new();
        collector.set_image(jpeg()).set_credential("sk-test");
        assert!(collector.is_ready());
        collector.set_credential("");
        assert!(!collector.is_ready());
    }
}
