use std::time::Duration;

use coordinator_core::{CallContext, SchedulerError, SchedulerResult};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

/// 远端资源类型，用于把 404/409 映射到具体的错误变体
#[derive(Debug, Clone, Copy)]
pub(crate) enum Resource<'a> {
    Task(&'a str),
    Worker(&'a str),
    Other,
}

/// 按 HTTP 状态码将失败响应归类到错误分类体系
pub(crate) fn classify_status(status: StatusCode, body: &str, resource: Resource<'_>) -> SchedulerError {
    let detail = format!("HTTP {status} - {body}");
    match status {
        StatusCode::NOT_FOUND => match resource {
            Resource::Task(id) => SchedulerError::TaskNotFound { id: id.to_string() },
            Resource::Worker(id) => SchedulerError::WorkerNotFound { id: id.to_string() },
            Resource::Other => SchedulerError::Permanent(detail),
        },
        StatusCode::CONFLICT => match resource {
            Resource::Worker(id) => SchedulerError::WorkerAlreadyExists { id: id.to_string() },
            _ => SchedulerError::Permanent(detail),
        },
        StatusCode::TOO_MANY_REQUESTS => SchedulerError::ResourceExhausted(detail),
        StatusCode::SERVICE_UNAVAILABLE => SchedulerError::Unavailable(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SchedulerError::Network(detail),
        s if s.is_client_error() => SchedulerError::Permanent(detail),
        _ => SchedulerError::Network(detail),
    }
}

/// 共享的 JSON over HTTP 客户端
#[derive(Clone)]
pub(crate) struct JsonClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl JsonClient {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("无法创建HTTP客户端: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// 发送请求；上下文结束时放弃请求
    pub(crate) async fn send(
        &self,
        ctx: &CallContext,
        request: RequestBuilder,
        resource: Resource<'_>,
    ) -> SchedulerResult<Response> {
        let request = match ctx.remaining() {
            Some(remaining) => request.timeout(remaining),
            None => request,
        };

        let response = tokio::select! {
            response = request.send() => response,
            _ = ctx.done() => {
                return Err(SchedulerError::DeadlineExceeded("请求被调用上下文取消".to_string()));
            }
        };

        let response = response.map_err(|e| SchedulerError::Network(format!("请求失败: {e}")))?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, resource))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: RequestBuilder,
        resource: Resource<'_>,
    ) -> SchedulerResult<T> {
        let response = self.send(ctx, request, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SchedulerError::Serialization(format!("无法解析响应: {e}")))
    }
}
