use std::sync::{Arc, RwLock};

use reqwest::multipart::Form;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::error::{ApiError, decode_error_message};

/// Authorized HTTP client shared by every service. The bearer credential is
/// held behind a shared handle so that all clones observe a login or logout
/// immediately; there is no process-global default header.
#[derive(Clone)]
pub struct ApiClient {
    http_client: HttpClient,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut normalized = base_url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        Ok(Self {
            http_client: HttpClient::new(),
            base_url: Url::parse(&normalized)?,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap() = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().unwrap().is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().unwrap().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .authorize(self.http_client.get(self.endpoint(path)?))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .authorize(self.http_client.post(self.endpoint(path)?))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn put_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .authorize(self.http_client.put(self.endpoint(path)?))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .authorize(self.http_client.post(self.endpoint(path)?))
            .form(fields)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<T, ApiError> {
        let response = self
            .authorize(self.http_client.post(self.endpoint(path)?))
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self
            .authorize(self.http_client.delete(self.endpoint(path)?))
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::failure(response).await)
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .authorize(self.http_client.get(self.endpoint(path)?))
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(response.bytes().await?.to_vec());
        }
        Err(Self::failure(response).await)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        Err(Self::failure(response).await)
    }

    async fn failure(response: Response) -> ApiError {
        let status: StatusCode = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::Status {
            status: status.as_u16(),
            message: decode_error_message(status.as_u16(), &body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let api = ApiClient::new("http://localhost:8000/api/v1").unwrap();
        let url = api.endpoint("models/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/models/");
    }

    #[test]
    fn token_is_shared_across_clones() {
        let api = ApiClient::new("http://localhost:8000/api/v1/").unwrap();
        let clone = api.clone();
        api.set_token(Some("secret".into()));
        assert!(clone.has_token());
        clone.set_token(None);
        assert!(!api.has_token());
    }
}
