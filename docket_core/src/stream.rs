//! Delivery of bulk read results.
//!
//! A scan produces documents through a [`ScanSink`]. The buffered sink
//! collects everything and hands back one `Result`; the channel sink feeds a
//! [`DocumentStream`] that the caller polls while the scan is still running.
//! Terminal methods consume the sink, so a scan reports completion or failure
//! exactly once.

use crate::document::Document;
use crate::error::{Error, Result};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// An event produced by a streaming scan.
#[derive(Debug)]
pub enum ScanEvent {
    /// A document that passed the filter.
    Document(Document),
    /// The scan finished successfully. No further events follow.
    End,
    /// The scan failed. No further events follow.
    Error(Error),
}

impl ScanEvent {
    /// Whether this is the last event of a scan.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanEvent::Document(_))
    }
}

/// Receiver side of a scan.
pub(crate) trait ScanSink {
    type Output;

    fn emit_item(&mut self, document: Document);

    fn emit_done(self) -> Self::Output;

    fn emit_error(self, error: Error) -> Self::Output;
}

/// Collects every document and returns them once the scan completes.
#[derive(Debug, Default)]
pub(crate) struct BufferedSink {
    documents: Vec<Document>,
}

impl ScanSink for BufferedSink {
    type Output = Result<Vec<Document>>;

    fn emit_item(&mut self, document: Document) {
        self.documents.push(document);
    }

    fn emit_done(self) -> Self::Output {
        Ok(self.documents)
    }

    fn emit_error(self, error: Error) -> Self::Output {
        Err(error)
    }
}

/// Forwards events to a [`DocumentStream`].
///
/// Send failures mean the stream was dropped; the scan still runs to
/// completion but nobody is listening.
#[derive(Debug)]
pub(crate) struct ChannelSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        Self { tx }
    }
}

impl ScanSink for ChannelSink {
    type Output = ();

    fn emit_item(&mut self, document: Document) {
        let _ = self.tx.send(ScanEvent::Document(document));
    }

    fn emit_done(self) -> Self::Output {
        let _ = self.tx.send(ScanEvent::End);
    }

    fn emit_error(self, error: Error) -> Self::Output {
        let _ = self.tx.send(ScanEvent::Error(error));
    }
}

/// A stream of scan events.
///
/// Yields zero or more [`ScanEvent::Document`] items followed by exactly one
/// terminal event, then ends. Events are buffered until polled, so nothing is
/// lost between starting the scan and consuming the stream.
#[derive(Debug)]
pub struct DocumentStream {
    rx: mpsc::UnboundedReceiver<ScanEvent>,
    finished: bool,
}

impl DocumentStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ScanEvent>) -> Self {
        Self {
            rx,
            finished: false,
        }
    }

    /// Drain the stream into a list, or the error that ended it.
    pub async fn collect_documents(mut self) -> Result<Vec<Document>> {
        use futures::StreamExt;

        let mut documents = Vec::new();
        while let Some(event) = self.next().await {
            match event {
                ScanEvent::Document(document) => documents.push(document),
                ScanEvent::End => break,
                ScanEvent::Error(err) => return Err(err),
            }
        }
        Ok(documents)
    }
}

impl Stream for DocumentStream {
    type Item = ScanEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                // Producer went away without a terminal event (task panicked
                // or the runtime shut down).
                this.finished = true;
                Poll::Ready(Some(ScanEvent::Error(Error::Io {
                    source: std::io::Error::other("scan stopped before completing"),
                })))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
