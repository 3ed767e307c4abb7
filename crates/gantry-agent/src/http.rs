//! HTTP implementations of the agent's server collaborators.

use crate::remote::{AgentInstruction, BuildRepositoryRemote, WorkPayload};
use crate::work::Work;
use gantry_core::agent::AgentRuntimeInfo;
use gantry_core::builder::FetchSpec;
use gantry_core::job::{JobResult, JobState};
use gantry_core::plan::JobIdentifier;
use gantry_core::ports::{ArtifactSink, ConsoleOut, ConsoleUploader, Property};
use gantry_core::{Error, Result};
use gantry_runner::archiver::{create_archive, extract_archive};
use reqwest::StatusCode;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

const ZSTD_ARCHIVE: &str = "application/zstd";

/// Shared HTTP plumbing against the server's agent API.
#[derive(Clone)]
pub struct ServerClient {
    client: Client,
    base: Url,
    cookie: Option<String>,
}

impl ServerClient {
    pub fn new(base: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("gantry-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            base,
            cookie: None,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Server URL {} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments.iter().flat_map(|s| s.split('/')).filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut request = self.client.request(method, self.url(segments)?);
        if let Some(cookie) = &self.cookie {
            request = request.header("X-Agent-Cookie", cookie);
        }
        Ok(request)
    }

    fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().map_err(|e| Error::Network(e.to_string()))?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::FORBIDDEN => Err(Error::AgentDenied(response.text().unwrap_or_default())),
            StatusCode::UNAUTHORIZED => Err(Error::AgentUnregistered(response.text().unwrap_or_default())),
            status => Err(Error::Network(format!("Server responded with {}", status))),
        }
    }

    fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(&self, segments: &[&str], body: &B) -> Result<T> {
        let response = Self::send(self.request(reqwest::Method::POST, segments)?.json(body))?;
        response.json().map_err(|e| Error::Serialization(e.to_string()))
    }

    fn post(&self, segments: &[&str], body: &impl Serialize) -> Result<()> {
        Self::send(self.request(reqwest::Method::POST, segments)?.json(body))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReport<'a> {
    agent: &'a AgentRuntimeInfo,
    job: &'a JobIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JobResult>,
}

#[derive(Deserialize)]
struct CookieResponse {
    cookie: String,
}

#[derive(Deserialize)]
struct IgnoredResponse {
    ignored: bool,
}

pub struct HttpRemote {
    client: ServerClient,
}

impl HttpRemote {
    pub fn new(client: ServerClient) -> Self {
        Self { client }
    }

    fn with_cookie(&self, info: &AgentRuntimeInfo) -> ServerClient {
        ServerClient {
            cookie: info.cookie().map(str::to_string),
            ..self.client.clone()
        }
    }
}

impl BuildRepositoryRemote for HttpRemote {
    fn ping(&self, info: &AgentRuntimeInfo) -> Result<AgentInstruction> {
        self.with_cookie(info).post_json(&["agent", "ping"], info)
    }

    fn get_cookie(&self, info: &AgentRuntimeInfo) -> Result<String> {
        let response: CookieResponse = self.client.post_json(&["agent", "cookie"], info)?;
        Ok(response.cookie)
    }

    fn get_work(&self, info: &AgentRuntimeInfo) -> Result<Work> {
        let payload: WorkPayload = self.with_cookie(info).post_json(&["agent", "work"], info)?;
        debug!(agent_uuid = %info.uuid(), "Received work");
        Ok(payload.into())
    }

    fn report_current_status(&self, info: &AgentRuntimeInfo, job: &JobIdentifier, state: JobState) -> Result<()> {
        let report = StatusReport {
            agent: info,
            job,
            state: Some(state),
            result: None,
        };
        self.with_cookie(info).post(&["agent", "status"], &report)
    }

    fn report_completing(&self, info: &AgentRuntimeInfo, job: &JobIdentifier, result: JobResult) -> Result<()> {
        let report = StatusReport {
            agent: info,
            job,
            state: Some(JobState::Completing),
            result: Some(result),
        };
        self.with_cookie(info).post(&["agent", "completing"], &report)
    }

    fn report_completed(&self, info: &AgentRuntimeInfo, job: &JobIdentifier, result: JobResult) -> Result<()> {
        let report = StatusReport {
            agent: info,
            job,
            state: Some(JobState::Completed),
            result: Some(result),
        };
        self.with_cookie(info).post(&["agent", "completed"], &report)
    }

    fn is_ignored(&self, job: &JobIdentifier) -> Result<bool> {
        let locator = job.build_locator();
        let response = ServerClient::send(self.client.request(reqwest::Method::GET, &["jobs", &locator, "ignored"])?)?;
        let body: IgnoredResponse = response.json().map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(body.ignored)
    }
}

/// Artifact store under `files/<build locator>/...`.
pub struct HttpArtifactSink {
    client: ServerClient,
}

impl HttpArtifactSink {
    pub fn new(client: ServerClient) -> Self {
        Self { client }
    }
}

impl ArtifactSink for HttpArtifactSink {
    fn publish(&self, console: &dyn ConsoleOut, dest_path: &str, source: &Path, job: &JobIdentifier) -> Result<()> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::IllegalArgument(format!("Nothing to upload at {}", source.display())))?;
        let locator = job.build_locator();
        let request = self
            .client
            .request(reqwest::Method::PUT, &["files", &locator, dest_path, &name])?;

        let (body, archived) = upload_body(source, &name)?;
        let request = if archived {
            request
                .query(&[("archive", "zstd")])
                .header(reqwest::header::CONTENT_TYPE, ZSTD_ARCHIVE)
                .body(body)
        } else {
            request.body(body)
        };

        ServerClient::send(request)?;
        console.print_go(&format!("Uploaded {} to [{}]", source.display(), dest_path));
        Ok(())
    }

    fn fetch(&self, console: &dyn ConsoleOut, spec: &FetchSpec, dest: &Path) -> Result<()> {
        console.print_go(&format!("Fetching artifact [{}] from [{}]", spec.source, spec.locator));
        let mut request = self
            .client
            .request(reqwest::Method::GET, &["files", &spec.locator, &spec.source])?;
        if !spec.is_file {
            request = request.query(&[("archive", "zstd")]);
        }
        let response = ServerClient::send(request)?;

        fs::create_dir_all(dest)?;
        if spec.is_file {
            let name = Path::new(&spec.source)
                .file_name()
                .ok_or_else(|| Error::IllegalArgument(format!("Invalid fetch source {}", spec.source)))?;
            let mut response = response;
            let mut file = File::create(dest.join(name))?;
            io::copy(&mut response, &mut file)?;
        } else {
            extract_archive(response, dest)?;
        }
        Ok(())
    }

    fn set_property(&self, job: &JobIdentifier, property: &Property) -> Result<()> {
        let locator = job.build_locator();
        let request = self
            .client
            .request(reqwest::Method::POST, &["properties", &locator, &property.key])?
            .body(property.value.clone());
        ServerClient::send(request)?;
        Ok(())
    }
}

/// Streams `source` from disk. Directories are packed into an anonymous
/// temporary file first, which goes away once the body is dropped.
fn upload_body(source: &Path, name: &str) -> Result<(Body, bool)> {
    let (file, archived) = if source.is_dir() {
        let mut spool = tempfile::tempfile()?;
        create_archive(&mut spool, source, name)?;
        spool.seek(SeekFrom::Start(0))?;
        (spool, true)
    } else {
        (File::open(source)?, false)
    };
    let length = file.metadata()?.len();
    Ok((Body::sized(file, length), archived))
}

/// Appends console chunks to the job's console log.
pub struct HttpConsoleUploader {
    client: ServerClient,
}

impl HttpConsoleUploader {
    pub fn new(client: ServerClient) -> Self {
        Self { client }
    }
}

impl ConsoleUploader for HttpConsoleUploader {
    fn upload(&self, job: &JobIdentifier, content: &str) -> Result<()> {
        let locator = job.build_locator();
        let request = self
            .client
            .request(reqwest::Method::PUT, &["files", &locator, "cruise-output", "console.log"])?
            .query(&[("append", "true")])
            .body(content.to_string());
        ServerClient::send(request)?;
        Ok(())
    }
}
