/*
 * SPDX-License-Identifier: MIT
 *
 * Permission is hereby granted, free of charge, to any person obtaining a
 * copy of this software and associated documentation files (the "Software"),
 * to deal in the Software without restriction, including without limitation
 * the rights to use, copy, modify, merge, publish, distribute, sublicense,
 * and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in
 * all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
 * THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
 * FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
 * DEALINGS IN THE SOFTWARE.
 */
use std::{collections::HashMap, time::Duration};

use reqwest::{
    header::HeaderMap, header::HeaderValue, header::ACCEPT, header::CONTENT_TYPE,
    header::LOCATION, Client as HttpClient, ClientBuilder as HttpClientBuilder, Method, Proxy,
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::model::service_root::RedfishVendor;
use crate::{Connector, HostDescriptor, Redfish, RedfishError};

pub const REDFISH_ENDPOINT: &str = "redfish/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
// Reachability probes should fail fast, the caller retries them.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct RedfishClientPoolBuilder {
    timeout: Duration,
    accept_invalid_certs: bool,
    proxy: Option<String>,
}

impl RedfishClientPoolBuilder {
    /// Only talk to BMCs whose certificate verifies. Off by default: factory iDRAC
    /// certificates are self signed.
    pub fn reject_invalid_certs(mut self) -> RedfishClientPoolBuilder {
        self.accept_invalid_certs = false;
        self
    }

    /// Per-request timeout. Reachability probes always use a shorter one.
    pub fn timeout(mut self, timeout: Duration) -> RedfishClientPoolBuilder {
        self.timeout = timeout;
        self
    }

    /// Send all BMC traffic through this HTTP, HTTPS or SOCKS5 proxy. Without it the
    /// usual https_proxy environment variable applies.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> RedfishClientPoolBuilder {
        self.proxy = Some(proxy_url.into());
        self
    }

    /// Build the shared connection pool.
    pub fn build(&self) -> Result<RedfishClientPool, RedfishError> {
        let mut builder = HttpClientBuilder::new()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .timeout(self.timeout);
        if let Some(p) = &self.proxy {
            let proxy = Proxy::all(p).map_err(|e| RedfishError::GenericError {
                error: format!("invalid proxy {p}: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }
        let http_client = builder.build().map_err(|e| RedfishError::GenericError {
            error: format!("could not build HTTP client: {e}"),
        })?;
        Ok(RedfishClientPool { http_client })
    }
}

/// Where a BMC's Redfish service lives and how to log in to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// BMC hostname or IP address
    pub host: String,
    /// HTTPS port, 443 when None
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RedfishClientPool {
    http_client: HttpClient,
}

impl RedfishClientPool {
    pub fn builder() -> RedfishClientPoolBuilder {
        RedfishClientPoolBuilder {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: true,
            proxy: None,
        }
    }

    /// Open a session to one BMC. Reads the service root to pick the vendor
    /// implementation, then the Systems and Managers collections for their ids.
    pub async fn create_client(
        &self,
        endpoint: Endpoint,
    ) -> Result<Box<dyn crate::Redfish>, RedfishError> {
        let client = RedfishHttpClient::new(self.http_client.clone(), endpoint);
        let s = crate::standard::RedfishStandard::new(client).await?;
        match s.vendor() {
            RedfishVendor::Dell => Ok(Box::new(crate::dell::Bmc::new(s)?)),
            _ => Ok(Box::new(s)),
        }
    }
}

#[async_trait::async_trait]
impl Connector for RedfishClientPool {
    async fn connect(&self, host: &HostDescriptor) -> Result<Box<dyn Redfish>, RedfishError> {
        self.create_client(host.endpoint()).await
    }
}

/// A HTTP client which targets a single BMC
pub struct RedfishHttpClient {
    endpoint: Endpoint,
    http_client: HttpClient,
}

impl RedfishHttpClient {
    pub fn new(http_client: HttpClient, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            http_client,
        }
    }

    pub async fn get<T>(&self, api: &str) -> Result<(StatusCode, T), RedfishError>
    where
        T: DeserializeOwned + ::std::fmt::Debug,
    {
        let (status_code, resp_opt) = self.req::<T, String>(Method::GET, api, None, None).await?;
        match resp_opt {
            Some(response_body) => Ok((status_code, response_body)),
            None => Err(RedfishError::NoContent),
        }
    }

    /// GET with the short probe timeout, discarding the body.
    pub async fn probe(&self, api: &str) -> Result<StatusCode, RedfishError> {
        let (status_code, _resp_body): (_, Option<serde_json::Value>) = self
            .req::<_, String>(Method::GET, api, None, Some(PROBE_TIMEOUT))
            .await?;
        Ok(status_code)
    }

    pub async fn post<B>(&self, api: &str, data: B) -> Result<StatusCode, RedfishError>
    where
        B: Serialize + ::std::fmt::Debug,
    {
        let (status_code, _resp_body): (_, Option<HashMap<String, serde_json::Value>>) =
            self.req(Method::POST, api, Some(data), None).await?;
        Ok(status_code)
    }

    /// POST which creates something, returning the Location header of the new resource.
    pub async fn post_with_location<B>(
        &self,
        api: &str,
        data: B,
    ) -> Result<(StatusCode, Option<String>), RedfishError>
    where
        B: Serialize + ::std::fmt::Debug,
    {
        let (status_code, headers, _body) = self.send(Method::POST, api, Some(data), None).await?;
        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((status_code, location))
    }

    pub async fn patch<T>(&self, api: &str, data: T) -> Result<StatusCode, RedfishError>
    where
        T: Serialize + ::std::fmt::Debug,
    {
        let (status_code, _resp_body): (_, Option<HashMap<String, serde_json::Value>>) =
            self.req(Method::PATCH, api, Some(data), None).await?;
        Ok(status_code)
    }

    pub async fn delete(&self, api: &str) -> Result<StatusCode, RedfishError> {
        let (status_code, _resp_body): (_, Option<HashMap<String, serde_json::Value>>) =
            self.req::<_, String>(Method::DELETE, api, None, None).await?;
        Ok(status_code)
    }

    pub async fn req<T, B>(
        &self,
        method: Method,
        api: &str,
        body: Option<B>,
        override_timeout: Option<Duration>,
    ) -> Result<(StatusCode, Option<T>), RedfishError>
    where
        T: DeserializeOwned + ::std::fmt::Debug,
        B: Serialize + ::std::fmt::Debug,
    {
        let url = self.url(api);
        let (status_code, _headers, response_body) =
            self.send(method, api, body, override_timeout).await?;
        if response_body.is_empty() {
            return Ok((status_code, None));
        }
        match serde_json::from_str(&response_body) {
            Ok(v) => Ok((status_code, Some(v))),
            Err(e) => Err(RedfishError::JsonDeserializeError {
                url,
                body: response_body,
                source: e,
            }),
        }
    }

    fn url(&self, api: &str) -> String {
        let api = api.trim_start_matches('/');
        match self.endpoint.port {
            Some(p) => format!(
                "https://{}:{}/{}/{}",
                self.endpoint.host, p, REDFISH_ENDPOINT, api
            ),
            None => format!(
                "https://{}/{}/{}",
                self.endpoint.host, REDFISH_ENDPOINT, api
            ),
        }
    }

    // Every request goes through here. Non-2xx answers become HTTPErrorCode with the body.
    async fn send<B>(
        &self,
        method: Method,
        api: &str,
        body: Option<B>,
        override_timeout: Option<Duration>,
    ) -> Result<(StatusCode, HeaderMap, String), RedfishError>
    where
        B: Serialize + ::std::fmt::Debug,
    {
        let url = self.url(api);
        let body_enc = match body {
            Some(b) => {
                let body_enc =
                    serde_json::to_string(&b).map_err(|e| RedfishError::JsonSerializeError {
                        url: url.clone(),
                        object_debug: format!("{b:?}"),
                        source: e,
                    })?;
                Some(body_enc)
            }
            None => None,
        };
        debug!(
            "TX {} {} {}",
            method,
            url,
            body_enc.as_deref().unwrap_or_default()
        );

        let mut req_b = self
            .http_client
            .request(method, &url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(user) = &self.endpoint.user {
            req_b = req_b.basic_auth(user, self.endpoint.password.as_ref());
        }
        if let Some(t) = override_timeout {
            req_b = req_b.timeout(t);
        }
        if let Some(b) = body_enc {
            req_b = req_b.body(b);
        }
        let response = req_b.send().await.map_err(|e| RedfishError::NetworkError {
            url: url.clone(),
            source: e,
        })?;
        let status_code = response.status();
        let headers = response.headers().clone();
        // iDRAC puts the useful part of an error in the JSON body
        let response_body = response
            .text()
            .await
            .map_err(|e| RedfishError::NetworkError {
                url: url.clone(),
                source: e,
            })?;
        if response_body.is_empty() {
            debug!("RX {status_code}");
        } else {
            debug!("RX {status_code} {response_body}");
        }

        if !status_code.is_success() {
            return Err(RedfishError::HTTPErrorCode {
                url,
                status_code,
                body: response_body,
            });
        }
        Ok((status_code, headers, response_body))
    }
}
