use crate::errors::FetchError;

pub struct BasicAuth<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

async fn send_request(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    auth: Option<&BasicAuth<'_>>,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut builder = client.get(url);
    for (key, value) in headers {
        builder = builder.header(*key, *value);
    }
    if let Some(auth) = auth {
        builder = builder.basic_auth(auth.user, Some(auth.password));
    }
    builder.send().await
}

fn handle_status(r: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let code = r.status().as_u16();
    if code == 200 {
        Ok(r)
    } else {
        Err(FetchError::Status { code })
    }
}

async fn resp_to_json<T: serde::de::DeserializeOwned>(
    r: reqwest::Response,
) -> Result<T, FetchError> {
    let body = r.text().await?;
    serde_json::from_str::<T>(&body).map_err(|e| FetchError::Decode {
        message: e.to_string(),
    })
}

pub async fn request<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    auth: Option<&BasicAuth<'_>>,
) -> Result<T, FetchError> {
    let response = send_request(client, url, headers, auth).await?;
    resp_to_json::<T>(handle_status(response)?).await
}
