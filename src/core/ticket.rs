//! Staged ticket validation
//!
//! The file-upload component hands over raw bytes and a file name. Before
//! anything touches the network the bytes are sniffed to make sure they are
//! an image format the scanner accepts.

use std::fmt;

use image::ImageFormat;

use crate::core::constants::MAX_TICKET_BYTES;
use crate::core::types::{Epoch, FailureKind, ScanFailure, ScanRequest};

/// Ticket image as staged by the upload component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTicket {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

impl StagedTicket {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
        }
    }
}

/// Reasons a staged ticket is rejected locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// Scan requested with nothing staged
    NoImage,
    /// Zero-byte file
    Empty,
    /// Larger than [`MAX_TICKET_BYTES`]
    TooLarge { size: usize },
    /// Not PNG, JPEG, WebP or GIF
    UnsupportedFormat,
}

impl fmt::Display for TicketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketError::NoImage => write!(f, "No ticket image selected"),
            TicketError::Empty => write!(f, "Ticket image is empty"),
            TicketError::TooLarge { size } => write!(
                f,
                "Ticket image is too large ({} bytes, max {})",
                size, MAX_TICKET_BYTES
            ),
            TicketError::UnsupportedFormat => {
                write!(f, "Ticket must be a PNG, JPEG, WebP or GIF image")
            }
        }
    }
}

impl std::error::Error for TicketError {}

impl From<TicketError> for ScanFailure {
    fn from(e: TicketError) -> Self {
        ScanFailure::new(FailureKind::ValidationError, e.to_string())
    }
}

/// Sniff the image format from magic bytes and return its MIME type
pub fn sniff_mime_type(bytes: &[u8]) -> Result<&'static str, TicketError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok("image/png"),
        Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(ImageFormat::WebP) => Ok("image/webp"),
        Ok(ImageFormat::Gif) => Ok("image/gif"),
        _ => Err(TicketError::UnsupportedFormat),
    }
}

/// Validate a staged ticket and build the request for `epoch`
pub fn build_request(
    ticket: Option<&StagedTicket>,
    lottery_type: Option<&str>,
    epoch: Epoch,
) -> Result<ScanRequest, TicketError> {
    let ticket = ticket.ok_or(TicketError::NoImage)?;

    if ticket.bytes.is_empty() {
        return Err(TicketError::Empty);
    }
    if ticket.bytes.len() > MAX_TICKET_BYTES {
        return Err(TicketError::TooLarge {
            size: ticket.bytes.len(),
        });
    }
    let mime_type = sniff_mime_type(&ticket.bytes)?;

    let lottery_type = lottery_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let file_name = if ticket.file_name.trim().is_empty() {
        "ticket".to_string()
    } else {
        ticket.file_name.clone()
    };

    Ok(ScanRequest {
        epoch,
        image: ticket.bytes.clone(),
        file_name,
        mime_type,
        lottery_type,
    })
}
