//! Outbound HTTP client adapter (espidf only).
//!
//! Implements [`HttpPost`](crate::backend::HttpPost) for the backend
//! registration heartbeat and [`UpdateSource`](crate::ota::UpdateSource)
//! for the OTA pull path. One connection per request; the bridge has no
//! keep-alive needs at one heartbeat per minute.

#[cfg(target_os = "espidf")]
pub use espidf_impl::EspHttp;

#[cfg(target_os = "espidf")]
mod espidf_impl {
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
    use esp_idf_svc::http::{Headers as _, Method};
    use esp_idf_svc::io::{Read as _, Write as _};
    use log::debug;

    use crate::backend::HttpPost;
    use crate::error::TransportError;
    use crate::ota::{ByteStream, UpdateSource};

    pub struct EspHttp;

    impl EspHttp {
        pub fn new() -> Self {
            Self
        }

        fn connect() -> Result<EspHttpConnection, TransportError> {
            EspHttpConnection::new(&Configuration::default())
                .map_err(|_| TransportError::ConnectFailed)
        }
    }

    impl Default for EspHttp {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HttpPost for EspHttp {
        fn post_json(&mut self, url: &str, body: &str) -> Result<u16, TransportError> {
            let mut conn = Self::connect()?;
            conn.initiate_request(
                Method::Post,
                url,
                &[("Content-Type", "application/json")],
            )
            .map_err(|_| TransportError::Io)?;

            let mut rest = body.as_bytes();
            while !rest.is_empty() {
                let n = conn.write(rest).map_err(|_| TransportError::Io)?;
                rest = &rest[n..];
            }
            conn.initiate_response().map_err(|_| TransportError::Io)?;
            let status = conn.status();
            debug!("http: POST {url} -> {status}");
            Ok(status)
        }
    }

    impl UpdateSource for EspHttp {
        type Image = EspImageStream;

        fn fetch_manifest(
            &mut self,
            url: &str,
        ) -> Result<heapless::String<256>, TransportError> {
            let mut conn = Self::connect()?;
            conn.initiate_request(Method::Get, url, &[])
                .map_err(|_| TransportError::Io)?;
            conn.initiate_response().map_err(|_| TransportError::Io)?;
            let status = conn.status();
            if status != 200 {
                return Err(TransportError::Status(status));
            }

            let mut body = heapless::String::new();
            let mut buf = [0u8; 128];
            loop {
                let n = conn.read(&mut buf).map_err(|_| TransportError::Io)?;
                if n == 0 {
                    break;
                }
                for &b in &buf[..n] {
                    // A manifest larger than the buffer is not a manifest.
                    body.push(b as char).map_err(|_| TransportError::Io)?;
                }
            }
            Ok(body)
        }

        fn open_image(&mut self, url: &str) -> Result<(u32, Self::Image), TransportError> {
            let mut conn = Self::connect()?;
            conn.initiate_request(Method::Get, url, &[])
                .map_err(|_| TransportError::Io)?;
            conn.initiate_response().map_err(|_| TransportError::Io)?;
            let status = conn.status();
            if status != 200 {
                return Err(TransportError::Status(status));
            }
            let len: u32 = conn
                .header("Content-Length")
                .and_then(|v| v.parse().ok())
                .ok_or(TransportError::Io)?;
            Ok((len, EspImageStream { conn }))
        }
    }

    /// Streaming body of an image download.
    pub struct EspImageStream {
        conn: EspHttpConnection,
    }

    impl ByteStream for EspImageStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            self.conn.read(buf).map_err(|_| TransportError::Io)
        }
    }
}
