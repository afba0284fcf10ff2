use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

use crate::Result;
use crate::http::request::{OutboundRequest, RequestBody, UploadSpec};
use crate::http::response::CallResponse;
use crate::http::transport::{Transport, TransportError};
use crate::http::types::Method;

/// 默认请求 Content-Type
pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=utf8";

/// 基于 reqwest 的传输实现
#[derive(Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    upload_root: PathBuf,
    download_dir: PathBuf,
}

impl HttpTransport {
    /// 不设置超时，等待服务端自行完成。
    /// 接受所有 cookie，登录 Call 写入的会话 cookie 会随后续请求发送。
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: reqwest::Client::builder().cookie_store(true).build()?,
            upload_root: PathBuf::from("."),
            download_dir: PathBuf::from("downloads"),
        })
    }

    pub fn with_upload_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.upload_root = root.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    fn builder(&self, method: Method, request: &OutboundRequest) -> reqwest::RequestBuilder {
        request
            .headers
            .iter()
            .fold(self.inner.request(method.to_reqwest(), &request.url), |req, (k, v)| {
                req.header(k.as_str(), v.as_str())
            })
    }

    async fn send_text(&self, request: &OutboundRequest, body: Option<&str>) -> std::result::Result<CallResponse, TransportError> {
        let mut req = self.builder(request.method, request);
        if let Some(body) = body {
            req = req.body(body.to_string());
        }

        let start = Instant::now();
        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.text().await?;

        Ok(CallResponse {
            status,
            headers,
            body: normalize_body(&body),
            duration: start.elapsed(),
        })
    }

    async fn upload(&self, request: &OutboundRequest, spec: &UploadSpec) -> std::result::Result<CallResponse, TransportError> {
        let mut form = Form::new();
        for (name, value) in &spec.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &spec.files {
            let path = self.upload_root.join(file);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|_| TransportError::MissingUpload(path.display().to_string()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.clone());
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("application/octet-stream")?;
            form = form.part(spec.part_name.clone(), part);
        }

        // multipart 自带 Content-Type 边界
        let headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("content-type"))
            .cloned()
            .collect();
        let req = headers
            .iter()
            .fold(self.inner.post(&request.url), |req, (k, v)| req.header(k.as_str(), v.as_str()));

        let start = Instant::now();
        let response = req.multipart(form).send().await?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.text().await?;
        info!(url = %request.url, files = spec.files.len(), status, "文件上传完成");

        Ok(CallResponse {
            status,
            headers,
            body,
            duration: start.elapsed(),
        })
    }

    async fn download(&self, request: &OutboundRequest) -> std::result::Result<CallResponse, TransportError> {
        let start = Instant::now();
        let response = self.builder(Method::Get, request).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(TransportError::Download(format!(
                "{} returned status {}",
                request.url, status
            )));
        }

        let headers = collect_headers(response.headers());
        let disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let file_name = download_file_name(disposition.as_deref(), &request.url);
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let target = self.download_dir.join(file_name);
        tokio::fs::write(&target, &bytes).await?;
        info!(path = %target.display(), size = bytes.len(), "文件下载完成");

        Ok(CallResponse {
            status,
            headers,
            body: target.display().to_string(),
            duration: start.elapsed(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> std::result::Result<CallResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "发送请求");
        match &request.body {
            RequestBody::Empty => self.send_text(request, None).await,
            RequestBody::Text(body) => self.send_text(request, Some(body)).await,
            RequestBody::Upload(spec) => self.upload(request, spec).await,
            RequestBody::Download => self.download(request).await,
        }
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect()
}

/// 制表符与换行替换为空格后去掉首尾空白
pub fn normalize_body(body: &str) -> String {
    body.replace(['\t', '\n', '\r'], " ").trim().to_string()
}

/// 文件名优先取 Content-Disposition，其次取 URL 最后一段
fn download_file_name(disposition: Option<&str>, url: &str) -> String {
    if let Some(name) = disposition
        .and_then(|d| d.split_once("filename="))
        .and_then(|(_, rest)| rest.split(';').next())
        .map(|name| name.trim().trim_matches('"'))
        .filter(|name| !name.is_empty())
    {
        return sanitize_file_name(name);
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit('/').next().filter(|s| !s.is_empty()) {
        Some(segment) => sanitize_file_name(segment),
        None => format!("download-{}", chrono::Utc::now().timestamp_millis()),
    }
}

fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.replace(['/', '\\'], "_"))
}

/// 每个 suite 一个的客户端：基础 URL、默认 header 与底层传输
pub struct SuiteClient {
    transport: Arc<dyn Transport>,
    base_url: Option<String>,
    default_headers: RwLock<Vec<(String, String)>>,
}

impl SuiteClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: None,
            default_headers: RwLock::new(Vec::new()),
        }
    }

    /// 去掉末尾的 `/`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        self.base_url = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let mut headers = self
            .default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        headers.push((name, value.into()));
    }

    pub fn remove_header(&self, name: &str) {
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.default_headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `http` / `www` 开头的 URL 视为绝对地址，其余拼接到基础 URL 之后
    pub fn resolve_url(&self, url: &str) -> std::result::Result<String, TransportError> {
        let url = url.trim();
        let joined = if url.starts_with("http") {
            url.to_string()
        } else if url.starts_with("www") {
            format!("http://{}", url)
        } else {
            match &self.base_url {
                Some(base) => format!("{}{}", base, url),
                None => {
                    return Err(TransportError::InvalidUrl(format!(
                        "{} (relative url without a base url)",
                        url
                    )));
                }
            }
        };

        let encoded = joined.replace(' ', "%20");
        url::Url::parse(&encoded).map_err(|_| TransportError::InvalidUrl(encoded.clone()))?;
        Ok(encoded)
    }

    /// header 优先级：默认 Content-Type < suite 默认 header < Call 自带 header
    pub fn build_request(
        &self,
        method: Method,
        url: &str,
        call_headers: &[(String, String)],
        body: RequestBody,
    ) -> std::result::Result<OutboundRequest, TransportError> {
        let mut request = OutboundRequest::new(method, self.resolve_url(url)?);
        if !matches!(body, RequestBody::Upload(_)) {
            request = request.with_header("Content-Type", DEFAULT_CONTENT_TYPE);
        }
        for (k, v) in self.headers().into_iter().chain(call_headers.iter().cloned()) {
            request = request.with_header(k, v);
        }
        Ok(request.with_body(body))
    }

    pub async fn send(&self, request: &OutboundRequest) -> std::result::Result<CallResponse, TransportError> {
        self.transport.send(request).await
    }
}
