// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Framed PDU transport over any async byte stream.
//!
//! Frames are delimited by the `length` field of the common header; the
//! reader refuses to allocate for a corrupt or oversized length and
//! hands the raw header back so the session can echo it in an Error
//! Report.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::models::common::{COMMON_HEADER_LEN, CommonHeader, PduError};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("connection closed by peer")]
    Closed,

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("read cancelled")]
    Cancelled,

    /// The common header arrived but its length field is unusable. The
    /// 8 raw header bytes are preserved for the Error Report echo.
    #[error("unusable frame header: {err}")]
    Frame {
        raw_header: [u8; COMMON_HEADER_LEN],
        err: PduError,
    },
}

/// A PDU-framed duplex connection. Read and write halves carry their
/// own locks so sending does not block the receive loop.
#[derive(Debug)]
pub struct PduConnection<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    cancel: CancellationToken,
}

impl<S: AsyncRead + AsyncWrite + Send> PduConnection<S> {
    pub fn new(stream: S, cancel: CancellationToken) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            cancel,
        }
    }

    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Read one complete PDU frame (header plus body).
    pub async fn read_frame(&self) -> Result<Bytes, ReadError> {
        let mut reader = self.reader.lock().await;

        let mut scratch = BytesMut::zeroed(COMMON_HEADER_LEN);
        self.read_exact(&mut reader, &mut scratch[..]).await?;

        let hdr = match CommonHeader::decode(&scratch[..]) {
            Ok(h) => h,
            Err(err) => {
                let mut raw_header = [0u8; COMMON_HEADER_LEN];
                raw_header.copy_from_slice(&scratch[..COMMON_HEADER_LEN]);
                return Err(ReadError::Frame { raw_header, err });
            },
        };

        let total = hdr.length.get() as usize;
        if total > COMMON_HEADER_LEN {
            scratch.resize(total, 0);
            self.read_exact(&mut reader, &mut scratch[COMMON_HEADER_LEN..])
                .await?;
        }
        trace!(
            pdu_type = hdr.pdu_type,
            length = total,
            "received PDU frame"
        );
        Ok(scratch.freeze())
    }

    async fn read_exact(
        &self,
        reader: &mut ReadHalf<S>,
        buf: &mut [u8],
    ) -> Result<(), ReadError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ReadError::Cancelled),
            res = reader.read_exact(buf) => match res {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    Err(ReadError::Closed)
                },
                Err(e) => Err(ReadError::Io(e)),
            },
        }
    }

    /// Write one encoded PDU.
    pub async fn send(&self, pdu: &[u8]) -> anyhow::Result<()> {
        if self.cancel.is_cancelled() {
            anyhow::bail!("connection cancelled");
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(pdu).await?;
        writer.flush().await?;
        Ok(())
    }
}
