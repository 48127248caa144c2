use {
    bytes::Bytes,
    courier_api::{InputFile, Method},
    reqwest::multipart::{Form, Part},
    serde::ser::Error as _,
};

use crate::error::{Error, Result};

pub(crate) const JSON: &str = "application/json";
pub(crate) const MULTIPART: &str = "multipart/form-data";

/// An encoded request body, kept so the same request can be re-issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Bytes),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<(String, String, Bytes)>,
    },
}

impl Payload {
    pub fn encode<M: Method>(method: &M) -> Result<Self> {
        let encode_err = |source| Error::Encode {
            method: M::NAME.to_string(),
            source,
        };

        if !method.has_uploads() {
            let body = serde_json::to_vec(method).map_err(encode_err)?;
            return Ok(Self::Json(Bytes::from(body)));
        }

        let files: Vec<(String, String, Bytes)> = method
            .input_files()
            .into_iter()
            .filter_map(|(field, file)| match file {
                InputFile::Upload { file_name, data } => {
                    Some((field.to_string(), file_name.clone(), data.clone()))
                },
                _ => None,
            })
            .collect();

        let serde_json::Value::Object(map) = serde_json::to_value(method).map_err(encode_err)?
        else {
            return Err(encode_err(serde_json::Error::custom(
                "method must serialize to a JSON object",
            )));
        };

        // Scalars go out verbatim, nested values as JSON text.
        let fields = map
            .into_iter()
            .filter(|(key, value)| !value.is_null() && !files.iter().any(|(f, ..)| f == key))
            .map(|(key, value)| match value {
                serde_json::Value::String(text) => (key, text),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(Self::Multipart { fields, files })
    }

    /// Encode an arbitrary JSON body for a method given by name.
    pub fn json(method: &str, body: &impl serde::Serialize) -> Result<Self> {
        serde_json::to_vec(body)
            .map(|body| Self::Json(Bytes::from(body)))
            .map_err(|source| Error::Encode {
                method: method.to_string(),
                source,
            })
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => JSON,
            Self::Multipart { .. } => MULTIPART,
        }
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Json(body) => request
                .header(reqwest::header::CONTENT_TYPE, JSON)
                .body(body.clone()),
            Self::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                for (name, file_name, data) in files {
                    let part = Part::stream_with_length(
                        reqwest::Body::from(data.clone()),
                        data.len() as u64,
                    )
                    .file_name(file_name.clone());
                    form = form.part(name.clone(), part);
                }
                request.multipart(form)
            },
        }
    }
}
