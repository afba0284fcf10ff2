use serde::Serialize;

use crate::http::transport::TransportError;
use crate::http::types::Method;
use crate::model::tokens::{DOWNLOAD_REQUEST, UPLOAD_REQUEST};

/// 多部分上传描述：`UPLOAD_REQUEST;a.txt,b.png;field=value|file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSpec {
    /// 相对上传根目录的文件路径
    pub files: Vec<String>,
    /// 额外的文本字段
    pub fields: Vec<(String, String)>,
    /// 文件部分的表单名
    pub part_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RequestBody {
    Empty,
    Text(String),
    Upload(UploadSpec),
    Download,
}

impl RequestBody {
    /// 根据保留前缀选择请求体类型
    pub fn parse(body: Option<&str>) -> Result<Self, TransportError> {
        let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
            return Ok(RequestBody::Empty);
        };

        if body.starts_with(UPLOAD_REQUEST) {
            return Self::parse_upload(body).map(RequestBody::Upload);
        }
        if body.starts_with(DOWNLOAD_REQUEST) {
            return Ok(RequestBody::Download);
        }
        Ok(RequestBody::Text(body.to_string()))
    }

    fn parse_upload(body: &str) -> Result<UploadSpec, TransportError> {
        let mut sections = body.split(';');
        sections.next();

        let files: Vec<String> = sections
            .next()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if files.is_empty() {
            return Err(TransportError::InvalidRequest(format!(
                "upload request names no files: {}",
                body
            )));
        }

        let mut fields = Vec::new();
        let mut part_name = String::new();
        if let Some(payload) = sections.next() {
            for entry in payload.split('|').map(str::trim).filter(|e| !e.is_empty()) {
                match entry.split_once('=') {
                    Some((name, value)) => fields.push((name.to_string(), value.to_string())),
                    None => part_name = entry.to_string(),
                }
            }
        }

        Ok(UploadSpec {
            files,
            fields,
            part_name,
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }
}

/// 解析完成、待发送的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// 同名 header 后写入的覆盖先写入的（忽略大小写）
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_empty_bodies() {
        assert_eq!(RequestBody::parse(None).unwrap(), RequestBody::Empty);
        assert_eq!(RequestBody::parse(Some("  ")).unwrap(), RequestBody::Empty);
        assert_eq!(
            RequestBody::parse(Some(r#"{"a":1}"#)).unwrap(),
            RequestBody::Text(r#"{"a":1}"#.to_string())
        );
        assert_eq!(
            RequestBody::parse(Some("DOWNLOAD_REQUEST")).unwrap(),
            RequestBody::Download
        );
    }

    #[test]
    fn test_upload_body() {
        let body =
            RequestBody::parse(Some("UPLOAD_REQUEST;docs/a.txt, img/b.png;kind=avatar|file|owner=7"))
                .unwrap();
        assert_eq!(
            body,
            RequestBody::Upload(UploadSpec {
                files: vec!["docs/a.txt".to_string(), "img/b.png".to_string()],
                fields: vec![
                    ("kind".to_string(), "avatar".to_string()),
                    ("owner".to_string(), "7".to_string()),
                ],
                part_name: "file".to_string(),
            })
        );
    }

    #[test]
    fn test_upload_without_files_is_invalid() {
        assert!(matches!(
            RequestBody::parse(Some("UPLOAD_REQUEST;")),
            Err(TransportError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_header_override_is_case_insensitive() {
        let request = OutboundRequest::new(Method::Get, "http://x")
            .with_header("Content-Type", "text/plain")
            .with_header("content-type", "application/xml");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("CONTENT-TYPE"), Some("application/xml"));
    }
}
