//! Single-shot query: send one prompt, print the answer, exit.

use crate::core::client::ApiClient;
use crate::core::error::ClientError;
use crate::core::session::Reply;
use crate::ui::display::Display;
use crate::ui::spinner::Spinner;
use crate::utils::fs::write_private;
use std::io::IsTerminal;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const WAITING: &str = "Waiting for response...";

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub stream: bool,
    pub render: bool,
    pub citations: bool,
    pub usage: bool,
    pub output: Option<PathBuf>,
    pub spinner: bool,
}

/// Read the whole of stdin when it is piped. Returns `None` for a terminal.
pub async fn read_piped_query() -> std::io::Result<Option<String>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(Some(input.trim().to_string()))
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
pub fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if wait_for_interrupt().await {
            eprintln!("\nInterrupted");
            cancel.cancel();
        }
    });
}

#[cfg(unix)]
async fn wait_for_interrupt() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            debug!(error = %err, "could not listen for SIGTERM");
            return tokio::signal::ctrl_c().await.is_ok();
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.is_ok(),
        _ = terminate.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}

/// Send `query` and print the answer with the requested sections.
pub async fn run_query(
    client: &ApiClient,
    query: &str,
    options: &QueryOptions,
    display: &mut Display,
    cancel: &CancellationToken,
) -> Result<Reply, ClientError> {
    debug!(
        model = client.model(),
        stream = options.stream,
        "processing query"
    );
    let mut indicator = options.spinner.then(|| Spinner::start(WAITING));

    let reply = if options.stream {
        let mut trailer = None;
        let result = client
            .query_stream_cancellable(
                query,
                cancel,
                |chunk| {
                    if let Some(indicator) = indicator.as_mut() {
                        indicator.stop();
                    }
                    display.chunk(chunk);
                },
                |response| trailer = Some(response.clone()),
            )
            .await;
        if let Some(indicator) = indicator.as_mut() {
            indicator.stop();
        }
        let content = match result {
            Ok(content) => content,
            Err(err) => {
                if err.is_cancelled() {
                    display.blank();
                }
                return Err(err);
            }
        };
        if options.render {
            display.line("\n---");
            display.content(&content, true);
        } else {
            display.blank();
        }
        Reply::from_response(content, trailer.as_ref())
    } else {
        let result = client.query_cancellable(query, cancel).await;
        if let Some(indicator) = indicator.as_mut() {
            indicator.stop();
        }
        let response = result?;
        let content = response.content().to_string();
        display.content(&content, options.render);
        Reply::from_response(content, Some(&response))
    };

    if options.citations {
        display.citations(&reply.citations);
    }
    if options.usage {
        if let Some(usage) = &reply.usage {
            display.usage(usage);
        }
    }

    if let Some(path) = &options.output {
        match write_private(path, &reply.content) {
            Ok(()) => eprintln!("Response saved to {}", path.display()),
            Err(err) => display.error(&format!("Failed to save output: {err}"), None),
        }
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::DEFAULT_MODEL;
    use crate::utils::test_utils::{create_test_client, MockResponse, MockServer, SharedBuffer};
    use tempfile::TempDir;

    fn buffered_display() -> (Display, SharedBuffer) {
        let buffer = SharedBuffer::new();
        (Display::new(Box::new(buffer.clone()), false), buffer)
    }

    #[tokio::test]
    async fn prints_answer_with_sections() {
        let server = MockServer::start(|_| MockResponse::completion("The answer.")).await;
        let client = create_test_client(&server.url, DEFAULT_MODEL);
        let (mut display, buffer) = buffered_display();
        let options = QueryOptions {
            citations: true,
            usage: true,
            ..QueryOptions::default()
        };
        let cancel = CancellationToken::new();

        let reply = run_query(&client, "question", &options, &mut display, &cancel)
            .await
            .unwrap();
        assert_eq!(reply.content, "The answer.");

        let output = buffer.contents();
        assert!(output.starts_with("The answer.\n"));
        assert!(output.contains("## Citations\n1. https://example.com/a\n"));
        assert!(output.contains("| **Total** | **5** |"));

        let request = &server.requests()[0];
        assert_eq!(request.body["messages"][0]["role"], "system");
        assert_eq!(request.body["messages"][1]["content"], "question");
    }

    #[tokio::test]
    async fn streaming_writes_chunks_then_a_newline() {
        let server = MockServer::start(|_| {
            MockResponse::events(&[
                r#"{"choices":[{"delta":{"content":"Str"}}]}"#,
                r#"{"choices":[{"delta":{"content":"eamed"}}]}"#,
                "[DONE]",
            ])
        })
        .await;
        let client = create_test_client(&server.url, DEFAULT_MODEL);
        let (mut display, buffer) = buffered_display();
        let options = QueryOptions {
            stream: true,
            usage: true,
            ..QueryOptions::default()
        };
        let cancel = CancellationToken::new();

        let reply = run_query(&client, "q", &options, &mut display, &cancel)
            .await
            .unwrap();
        assert_eq!(reply.content, "Streamed");
        assert_eq!(reply.usage, None);
        assert_eq!(buffer.contents(), "Streamed\n");
    }

    #[tokio::test]
    async fn output_file_receives_the_answer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("answer.md");
        let server = MockServer::start(|_| MockResponse::completion("saved text")).await;
        let client = create_test_client(&server.url, DEFAULT_MODEL);
        let (mut display, _buffer) = buffered_display();
        let options = QueryOptions {
            output: Some(path.clone()),
            ..QueryOptions::default()
        };
        let cancel = CancellationToken::new();

        run_query(&client, "q", &options, &mut display, &cancel)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved text");
    }

    #[tokio::test]
    async fn api_errors_are_returned_to_the_caller() {
        let server = MockServer::start(|_| MockResponse::error(400, "bad model")).await;
        let client = create_test_client(&server.url, DEFAULT_MODEL);
        let (mut display, buffer) = buffered_display();

        let err = run_query(
            &client,
            "q",
            &QueryOptions::default(),
            &mut display,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "API error: bad model");
        assert!(buffer.contents().is_empty());
    }
}
