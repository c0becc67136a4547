use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use zip::write::SimpleFileOptions;

use crate::core::downloader::BundleTransport;
use crate::core::error::{LoaderError, LoaderResult};

/// Build an in-memory bundle archive from `(path, contents)` pairs.
pub fn zip_bundle(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[derive(Clone)]
enum Scripted {
    Text(String),
    Bytes(Vec<u8>),
    Fail(String),
}

/// In-memory transport answering from a script and recording every call.
///
/// URLs are matched without their query string, so cache-busting
/// parameters do not matter.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve_text(&self, url: &str, text: &str) {
        self.script
            .lock()
            .insert(strip_query(url), Scripted::Text(text.to_string()));
    }

    pub fn serve_bytes(&self, url: &str, bytes: Vec<u8>) {
        self.script
            .lock()
            .insert(strip_query(url), Scripted::Bytes(bytes));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.script
            .lock()
            .insert(strip_query(url), Scripted::Fail(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        let url = strip_query(url);
        self.calls
            .lock()
            .iter()
            .filter(|call| strip_query(call) == url)
            .count()
    }

    async fn answer(&self, url: &str) -> LoaderResult<Scripted> {
        self.calls.lock().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().get(&strip_query(url)).cloned();
        match scripted {
            Some(Scripted::Fail(message)) => Err(LoaderError::transport(url, message)),
            Some(answer) => Ok(answer),
            None => Err(LoaderError::transport(url, "HTTP 404")),
        }
    }
}

#[async_trait]
impl BundleTransport for ScriptedTransport {
    async fn fetch_text(&self, url: &str) -> LoaderResult<String> {
        match self.answer(url).await? {
            Scripted::Text(text) => Ok(text),
            Scripted::Bytes(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Scripted::Fail(message) => Err(LoaderError::transport(url, message)),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> LoaderResult<Vec<u8>> {
        match self.answer(url).await? {
            Scripted::Text(text) => Ok(text.into_bytes()),
            Scripted::Bytes(bytes) => Ok(bytes),
            Scripted::Fail(message) => Err(LoaderError::transport(url, message)),
        }
    }
}

fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}
