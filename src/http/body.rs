//! Request body normalisation.
//!
//! Bodies are owned, replayable values: the same `RequestBody` is applied to
//! the original request and, after a session refresh, to its retry.

use reqwest::RequestBuilder;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

const JSON_CONTENT_TYPE: &str = "application/json";

/// The payload of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized to JSON text and tagged `application/json` unless the
    /// caller already set a content type.
    Json(Value),
    /// Sent verbatim.
    Text(String),
    /// Sent verbatim.
    Bytes(Vec<u8>),
    /// Sent as `multipart/form-data`; the transport chooses the boundary.
    Multipart(MultipartBody),
}

impl RequestBody {
    /// Converts any serializable value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Attaches this body to `builder`. `headers` are the caller headers
    /// already set on the builder.
    pub(crate) fn apply(
        &self,
        builder: RequestBuilder,
        headers: &HeaderMap,
    ) -> Result<RequestBuilder> {
        let builder = match self {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => {
                let payload = serde_json::to_vec(value)?;
                let builder = if headers.contains_key(CONTENT_TYPE) {
                    builder
                } else {
                    builder.header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
                };
                builder.body(payload)
            }
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(multipart) => builder.multipart(multipart.to_form()?),
        };
        Ok(builder)
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<MultipartBody> for RequestBody {
    fn from(multipart: MultipartBody) -> Self {
        RequestBody::Multipart(multipart)
    }
}

impl<T: Into<RequestBody>> From<Option<T>> for RequestBody {
    fn from(body: Option<T>) -> Self {
        body.map(Into::into).unwrap_or_default()
    }
}

/// A multipart form kept as owned parts so it can be rebuilt for a retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

#[derive(Debug, Clone, PartialEq)]
struct MultipartPart {
    name: String,
    data: Vec<u8>,
    file_name: Option<String>,
    mime: Option<String>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            data: value.into().into_bytes(),
            file_name: None,
            mime: None,
        });
        self
    }

    /// Adds a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            data,
            file_name: Some(file_name.into()),
            mime: Some(mime.into()),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            let mut p = Part::bytes(part.data.clone());
            if let Some(file_name) = &part.file_name {
                p = p.file_name(file_name.clone());
            }
            if let Some(mime) = &part.mime {
                p = p.mime_str(mime)?;
            }
            form = form.part(part.name.clone(), p);
        }
        Ok(form)
    }
}
