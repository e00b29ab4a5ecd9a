use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{error, info, warn};

use crate::charts::suburbs::Suburb;
use crate::config::CHART_PATH;
use crate::error::Result;
use crate::fetcher::Pacer;
use crate::session::Session;

/// The chart endpoint answers with either base64 text or raw PNG bytes.
pub fn decode_chart(body: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(body);
    match BASE64.decode(text.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => body.to_vec(),
    }
}

/// `<dir>/chart_<locality>_<state>_<postcode>_<code>.png`
pub fn chart_path(dir: &Path, suburb: &Suburb, code: &str) -> PathBuf {
    dir.join(format!(
        "chart_{}_{}_{}_{}.png",
        suburb.locality.trim(),
        suburb.state.trim(),
        suburb.post_code,
        code
    ))
}

/// Download one suburb's historical DSR chart into `temp_dir`.
/// Returns `Ok(None)` when the suburb is skipped or the request fails.
pub async fn fetch_chart(session: &Session, suburb: &Suburb, temp_dir: &Path) -> Result<Option<PathBuf>> {
    let Some(code) = suburb.property_type_code() else {
        warn!(
            "Unknown property type {:?} for {}, skipping",
            suburb.property_type, suburb.locality
        );
        return Ok(None);
    };

    let url = format!("{}{}", session.base_url, CHART_PATH);
    let params = [
        ("access_token", session.access_token.as_str()),
        ("state", suburb.state.trim()),
        ("postCode", suburb.post_code.as_str()),
        ("locality", suburb.locality.trim()),
        ("propTypeCode", code),
        ("statCode", "DSR"),
    ];
    let resp = match session.client.get(&url).query(&params).send().await {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to make GET request: {e}");
            return Ok(None);
        }
    };
    info!("GET {url} - {}", resp.status().as_u16());
    if !resp.status().is_success() {
        error!("Chart request for {} failed with HTTP {}", suburb.locality, resp.status().as_u16());
        return Ok(None);
    }
    let body = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to read chart body for {}: {e}", suburb.locality);
            return Ok(None);
        }
    };

    std::fs::create_dir_all(temp_dir)?;
    let path = chart_path(temp_dir, suburb, code);
    std::fs::write(&path, decode_chart(&body))?;
    info!("Chart saved as '{}'.", path.display());
    Ok(Some(path))
}

/// Fetch every suburb's chart in turn with a paced pause after each.
pub async fn fetch_all(session: &Session, suburbs: &[Suburb], temp_dir: &Path, pacer: &Pacer) -> Result<usize> {
    let mut saved = 0;
    for suburb in suburbs {
        if fetch_chart(session, suburb, temp_dir).await?.is_some() {
            saved += 1;
            info!(
                "Retrieved charts for {}, {}, {}, {}",
                suburb.locality, suburb.state, suburb.post_code, suburb.property_type
            );
        }
        pacer.pause().await;
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn bondi() -> Suburb {
        Suburb {
            locality: "Bondi".to_string(),
            state: "NSW".to_string(),
            post_code: "2026".to_string(),
            property_type: "House".to_string(),
        }
    }

    #[test]
    fn decodes_base64_payload() {
        let encoded = BASE64.encode(PNG_MAGIC);
        assert_eq!(decode_chart(format!("{encoded}\n").as_bytes()), PNG_MAGIC);
    }

    #[test]
    fn keeps_raw_png_payload() {
        assert_eq!(decode_chart(PNG_MAGIC), PNG_MAGIC);
    }

    #[test]
    fn chart_file_name_includes_suburb_key() {
        let p = chart_path(Path::new("tmp"), &bondi(), "H");
        assert_eq!(p, Path::new("tmp").join("chart_Bondi_NSW_2026_H.png"));
    }

    #[tokio::test]
    async fn saves_chart_with_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHART_PATH))
            .and(query_param("access_token", "tok"))
            .and(query_param("locality", "Bondi"))
            .and(query_param("propTypeCode", "H"))
            .and(query_param("statCode", "DSR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BASE64.encode(PNG_MAGIC)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(reqwest::Client::new(), &server.uri(), "tok");
        let saved = fetch_chart(&session, &bondi(), dir.path()).await.unwrap().unwrap();
        assert_eq!(std::fs::read(saved).unwrap(), PNG_MAGIC);
    }

    #[tokio::test]
    async fn failed_chart_request_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(reqwest::Client::new(), &server.uri(), "tok");
        let suburbs = vec![bondi(), bondi()];
        let saved = fetch_all(&session, &suburbs, dir.path(), &Pacer::new(0, 0)).await.unwrap();
        assert_eq!(saved, 0);
    }
}
