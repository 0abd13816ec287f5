use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, geo::Coordinate, matrix::DurationMatrix};

use super::DurationMatrixProvider;

pub const DEFAULT_GRAPHHOPPER_URL: &str = "https://graphhopper.com/api/1/matrix";
const OUT_ARRAY_TIMES: &str = "times";

/// GraphHopper Matrix API client. Every failure is terminal for the request.
pub struct GraphHopperProvider {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct MatrixRequest<'a> {
    points: Vec<[f64; 2]>,
    profile: &'a str,
    out_arrays: [&'static str; 1],
    fail_fast: bool,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    times: Option<Vec<Vec<Option<f64>>>>,
    message: Option<String>,
}

impl GraphHopperProvider {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::invalid_input(
                "graphhopper provider requires an API key (--graphhopper-key or GRAPHHOPPER_API_KEY)",
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::unavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl DurationMatrixProvider for GraphHopperProvider {
    fn durations(&self, points: &[Coordinate], profile: &str) -> Result<DurationMatrix> {
        let body = MatrixRequest {
            points: points.iter().map(|p| p.lng_lat()).collect(),
            profile,
            out_arrays: [OUT_ARRAY_TIMES],
            fail_fast: true,
        };
        log::debug!(
            "provider.graphhopper: request n={} profile={profile}",
            points.len()
        );

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| Error::unavailable(format!("graphhopper request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::unavailable(format!("graphhopper response unreadable: {e}")))?;
        if !status.is_success() {
            let message = serde_json::from_str::<MatrixResponse>(&text)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(text);
            return Err(Error::unavailable(format!(
                "graphhopper returned {status}: {message}"
            )));
        }

        parse_times(&text, points.len())
    }

    fn name(&self) -> &'static str {
        "graphhopper"
    }
}

fn parse_times(body: &str, n: usize) -> Result<DurationMatrix> {
    let response: MatrixResponse = serde_json::from_str(body)
        .map_err(|e| Error::unavailable(format!("graphhopper response is not valid JSON: {e}")))?;
    let times = response.times.ok_or_else(|| {
        Error::unavailable(format!(
            "graphhopper response has no times: {}",
            response.message.unwrap_or_default()
        ))
    })?;

    let mut rows = Vec::with_capacity(times.len());
    for (i, row) in times.into_iter().enumerate() {
        let row = row
            .into_iter()
            .enumerate()
            .map(|(j, t)| {
                t.ok_or_else(|| Error::unavailable(format!("graphhopper found no route {i}->{j}")))
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }

    let matrix = DurationMatrix::from_rows(rows)
        .map_err(|e| Error::unavailable(format!("graphhopper matrix malformed: {e}")))?;
    if matrix.size() != n {
        return Err(Error::unavailable(format!(
            "graphhopper returned {} rows for {n} points",
            matrix.size()
        )));
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream},
        sync::mpsc,
        thread::{self, JoinHandle},
        time::Duration,
    };

    use super::{GraphHopperProvider, MatrixRequest, parse_times};
    use crate::{geo::Coordinate, provider::DurationMatrixProvider};

    fn points() -> Vec<Coordinate> {
        vec![Coordinate::new(50.06, 19.94), Coordinate::new(50.07, 19.95)]
    }

    /// Consumes one request's head and body.
    fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).expect("read request");
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Answers a single request with `status` and a JSON `body`.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/matrix", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write");
            stream.flush().expect("flush");
        });
        (url, handle)
    }

    #[test]
    fn request_sends_points_as_lng_lat() {
        let body = MatrixRequest {
            points: vec![Coordinate::new(50.06, 19.94).lng_lat()],
            profile: "car",
            out_arrays: ["times"],
            fail_fast: true,
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert_eq!(
            json,
            r#"{"points":[[19.94,50.06]],"profile":"car","out_arrays":["times"],"fail_fast":true}"#
        );
    }

    #[test]
    fn parse_times_reads_square_matrix() {
        let m = parse_times(r#"{"times":[[0,12],[15,0]],"info":{}}"#, 2).expect("parse");
        assert_eq!(m.get(0, 1), 12.0);
        assert_eq!(m.get(1, 0), 15.0);
    }

    #[test]
    fn parse_times_reports_unreachable_pairs_and_shape_mismatch_as_unavailable() {
        let err = parse_times(r#"{"times":[[0,null],[15,0]]}"#, 2).expect_err("null time");
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("no route 0->1"));

        let err = parse_times(r#"{"times":[[0]]}"#, 2).expect_err("wrong size");
        assert!(err.is_unavailable());

        let err = parse_times(r#"{"message":"API limit reached"}"#, 2).expect_err("no times");
        assert!(err.to_string().contains("API limit reached"));
    }

    #[test]
    fn new_requires_api_key() {
        let err = GraphHopperProvider::new("http://localhost", " ", Duration::from_secs(1))
            .err()
            .expect("empty key should fail");
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn durations_reads_times_from_a_successful_response() {
        let (url, server) = serve_once("200 OK", r#"{"times":[[0,90],[120,0]]}"#);
        let provider =
            GraphHopperProvider::new(&url, "k", Duration::from_secs(5)).expect("provider");
        let m = provider.durations(&points(), "car").expect("durations");
        assert_eq!(m.get(0, 1), 90.0);
        assert_eq!(m.get(1, 0), 120.0);
        server.join().expect("server");
    }

    #[test]
    fn error_status_is_unavailable_with_server_message() {
        let (url, server) = serve_once(
            "429 Too Many Requests",
            r#"{"message":"API limit reached"}"#,
        );
        let provider =
            GraphHopperProvider::new(&url, "k", Duration::from_secs(5)).expect("provider");
        let err = provider
            .durations(&points(), "car")
            .expect_err("rate limited");
        assert!(err.is_unavailable());
        let message = err.to_string();
        assert!(message.contains("429"), "{message}");
        assert!(message.contains("API limit reached"), "{message}");
        server.join().expect("server");
    }

    #[test]
    fn silent_server_times_out_as_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/matrix", listener.local_addr().expect("addr"));
        let (release, held) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            read_request(&mut stream);
            // Hold the connection open without answering.
            let _ = held.recv_timeout(Duration::from_secs(10));
        });

        let provider =
            GraphHopperProvider::new(&url, "k", Duration::from_millis(200)).expect("provider");
        let err = provider
            .durations(&points(), "car")
            .expect_err("no response within the timeout");
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("graphhopper request failed"));

        drop(release);
        server.join().expect("server");
    }
}
