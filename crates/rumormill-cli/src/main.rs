//! One-shot command-line client for a running rumormill daemon.
//!
//! Talks to the daemon's HTTP API on localhost:
//!
//! ```text
//! rumormill-client --UIPort 8080 --msg "hello"
//! rumormill-client --UIPort 8080 --msg "psst" --Dest <name>
//! rumormill-client --UIPort 8080 --file report.pdf
//! rumormill-client --UIPort 8080 --file report.pdf --request <hex> [--Dest <name>]
//! rumormill-client --UIPort 8080 --keywords report,pdf --budget 4
//! ```
//!
//! Exits non-zero on any HTTP failure.

use clap::Parser;
use serde::Serialize;

/// Client for the rumormill gossip daemon.
#[derive(Parser)]
#[command(name = "rumormill-client", version, about)]
struct Args {
    /// HTTP port of the target daemon.
    #[arg(long = "UIPort", default_value_t = 10001)]
    ui_port: u16,

    /// Message text to send.
    #[arg(long = "msg", default_value = "")]
    msg: String,

    /// Destination name: makes --msg private, or names the peer for
    /// --request.
    #[arg(long = "Dest", default_value = "")]
    dest: String,

    /// File to upload (alone) or to download (with --request).
    #[arg(long = "file", default_value = "")]
    file: String,

    /// Hex metahash of the file to download.
    #[arg(long = "request", default_value = "")]
    request: String,

    /// Comma-separated search keywords.
    #[arg(long = "keywords", default_value = "")]
    keywords: String,

    /// Search budget (0 = expanding ring).
    #[arg(long = "budget", default_value_t = 0)]
    budget: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchBody {
    keywords: String,
    budget: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PrivateBody {
    destination: String,
    content: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let base_url = format!("http://127.0.0.1:{}", args.ui_port);
    let client = reqwest::Client::new();

    let outcome = if !args.keywords.is_empty() {
        search(&client, &base_url, &args).await
    } else if !args.file.is_empty() && !args.request.is_empty() {
        download(&client, &base_url, &args).await
    } else if !args.file.is_empty() {
        upload(&client, &base_url, &args).await
    } else if args.dest.is_empty() {
        send_public(&client, &base_url, &args).await
    } else {
        send_private(&client, &base_url, &args).await
    };

    if let Err(e) = outcome {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn search(
    client: &reqwest::Client,
    base_url: &str,
    args: &Args,
) -> Result<(), String> {
    let body = SearchBody {
        keywords: args.keywords.clone(),
        budget: args.budget.to_string(),
    };
    let mut response = client
        .post(format!("{base_url}/search"))
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("unable to send the search request: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("search request failed: {}", response.status()));
    }
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| format!("search stream broke: {e}"))?
    {
        print!("{}", String::from_utf8_lossy(&chunk));
    }
    Ok(())
}

async fn download(
    client: &reqwest::Client,
    base_url: &str,
    args: &Args,
) -> Result<(), String> {
    let form = [
        ("fileName", args.file.clone()),
        ("fileHash", args.request.clone()),
        ("filePeer", args.dest.clone()),
    ];
    let response = client
        .post(format!("{base_url}/download"))
        .form(&form)
        .send()
        .await
        .map_err(|e| format!("unable to send the download request: {e}"))?;

    match response.status() {
        reqwest::StatusCode::OK => {
            let data = response
                .bytes()
                .await
                .map_err(|e| format!("download stream broke: {e}"))?;
            std::fs::write(&args.file, &data)
                .map_err(|e| format!("cannot write '{}': {e}", args.file))?;
            println!("File downloaded correctly");
            Ok(())
        }
        reqwest::StatusCode::NOT_FOUND => {
            let reason = response.text().await.unwrap_or_default();
            Err(format!("File not found\n{reason}"))
        }
        status => Err(format!("download request failed: {status}")),
    }
}

async fn upload(
    client: &reqwest::Client,
    base_url: &str,
    args: &Args,
) -> Result<(), String> {
    let data = std::fs::read(&args.file)
        .map_err(|_| "unable to open the file for upload (does it exist?)".to_string())?;
    let file_name = std::path::Path::new(&args.file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.file.clone());

    let form = reqwest::multipart::Form::new().part(
        "uploadedFile",
        reqwest::multipart::Part::bytes(data).file_name(file_name),
    );
    let response = client
        .post(format!("{base_url}/upload"))
        .multipart(form)
        .send()
        .await
        .map_err(|e| format!("unable to upload the file (is the daemon running?): {e}"))?;
    if !response.status().is_success() {
        return Err(format!("upload failed: {}", response.status()));
    }
    println!("{}", response.text().await.unwrap_or_default());
    Ok(())
}

async fn send_public(
    client: &reqwest::Client,
    base_url: &str,
    args: &Args,
) -> Result<(), String> {
    let response = client
        .post(format!("{base_url}/message"))
        .json(&args.msg)
        .send()
        .await
        .map_err(|e| format!("unable to send the gossip message: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("message rejected: {}", response.status()));
    }
    Ok(())
}

async fn send_private(
    client: &reqwest::Client,
    base_url: &str,
    args: &Args,
) -> Result<(), String> {
    let body = PrivateBody {
        destination: args.dest.clone(),
        content: args.msg.clone(),
    };
    let response = client
        .post(format!("{base_url}/privateMessage"))
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("unable to send the private message: {e}"))?;
    if !response.status().is_success() {
        let reason = response.text().await.unwrap_or_default();
        return Err(format!("private message rejected: {reason}"));
    }
    Ok(())
}
