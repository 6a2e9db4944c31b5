//! Opens an SSE connection to the remote event endpoint and maps frames to
//! [`EventEnvelope`] values in arrival order.

use eventsource_stream::Eventsource;
use futures::Stream;
use mira_api::error::Error;
use mira_api::event::EventEnvelope;
use tokio_stream::StreamExt;

pub(crate) fn open(
    client: reqwest::Client,
    url: String,
    directory: Option<String>,
) -> impl Stream<Item = Result<EventEnvelope, Error>> + Send {
    async_stream::try_stream! {
        let mut request = client.get(&url);
        if let Some(directory) = &directory {
            request = request.query(&[("directory", directory.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(Box::new(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Api {
                status: status.as_u16(),
                message: body,
            })?;
            unreachable!();
        }

        let mut sse = response.bytes_stream().eventsource();

        while let Some(frame) = sse.next().await {
            match frame {
                Ok(frame) => {
                    // Keep-alive frames carry no data.
                    if frame.data.is_empty() {
                        continue;
                    }
                    let envelope: EventEnvelope = serde_json::from_str(&frame.data)?;
                    yield envelope;
                }
                Err(e) => {
                    Err(Error::Sse(e.to_string()))?;
                }
            }
        }
    }
}
