use {
    bytes::Bytes,
    serde::{Serialize, Serializer},
};

/// A file argument: an existing file id, a URL for the server to fetch,
/// or bytes uploaded with the request.
///
/// Requests carrying an [`InputFile::Upload`] are sent as multipart form data.
#[derive(Clone, PartialEq, Eq)]
pub enum InputFile {
    FileId(String),
    Url(String),
    Upload { file_name: String, data: Bytes },
}

impl InputFile {
    pub fn upload(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Upload {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    #[must_use]
    pub fn is_upload(&self) -> bool {
        matches!(self, Self::Upload { .. })
    }
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileId(id) => f.debug_tuple("FileId").field(id).finish(),
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Upload { file_name, data } => f
                .debug_struct("Upload")
                .field("file_name", file_name)
                .field("len", &data.len())
                .finish(),
        }
    }
}

impl Serialize for InputFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::FileId(value) | Self::Url(value) => serializer.serialize_str(value),
            // Uploads travel as their own multipart part under the field name.
            Self::Upload { file_name, .. } => {
                serializer.serialize_str(&format!("attach://{file_name}"))
            },
        }
    }
}
