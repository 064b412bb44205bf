//! Expedited SDO request and response codec
//!
//! The drives are only ever accessed with expedited transfers of at most 4 bytes, so segmented and
//! block transfers are not represented.
use snafu::Snafu;

use crate::messages::{CanId, CanMessage};

/// Error decoding or encoding an SDO frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum SdoError {
    /// Expedited writes may carry 1, 2 or 4 bytes
    #[snafu(display("Unsupported expedited transfer length {len}"))]
    UnsupportedLength {
        /// The requested length
        len: usize,
    },
    /// The frame is shorter than required by its command specifier
    #[snafu(display("SDO frame too short ({len} bytes)"))]
    TooShort {
        /// The number of bytes received
        len: usize,
    },
    /// The command byte is not one handled here
    #[snafu(display("Unsupported SDO command byte 0x{value:02X}"))]
    InvalidCommand {
        /// The command byte
        value: u8,
    },
}

/// Specifies the possible server command specifier (SCS) values in SDO response packets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerCommand {
    /// Response to an upload (read) request
    Upload = 2,
    /// Acknowledge a download (write) command
    Download = 3,
    /// Abort transfer
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerCommand::*;
        match value {
            2 => Ok(Upload),
            3 => Ok(Download),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// Specifies the client command specifier (CCS) values in SDO request packets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// Begin a download (write)
    InitiateDownload = 1,
    /// Begin an upload (read)
    InitiateUpload = 2,
}

/// Well known abort codes, used to make logs readable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AbortCode {
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Access failed due to hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application because of the device state
    CantStoreDeviceState = 0x0800_0022,
}

impl AbortCode {
    /// Look up a raw abort code
    pub fn from_raw(value: u32) -> Option<AbortCode> {
        use AbortCode::*;
        [
            SdoTimeout,
            InvalidCommandSpecifier,
            UnsupportedAccess,
            ReadOnly,
            NoSuchObject,
            HardwareError,
            DataTypeMismatch,
            InvalidValue,
            GeneralError,
            CantStoreDeviceState,
        ]
        .into_iter()
        .find(|c| *c as u32 == value)
    }
}

/// An expedited SDO request sent by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoRequest {
    /// Write up to 4 bytes
    InitiateDownload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Number of valid bytes in data (1, 2 or 4)
        len: u8,
        /// Value, little endian
        data: [u8; 4],
    },
    /// Request the value of an object
    InitiateUpload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
}

impl SdoRequest {
    /// Create an expedited download message
    pub fn expedited_download(index: u16, sub: u8, data: &[u8]) -> Result<Self, SdoError> {
        match data.len() {
            1 | 2 | 4 => (),
            len => return UnsupportedLengthSnafu { len }.fail(),
        }
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        Ok(SdoRequest::InitiateDownload {
            index,
            sub,
            len: data.len() as u8,
            data: msg_data,
        })
    }

    /// Create an upload request
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// The addressed object
    pub fn object(&self) -> (u16, u8) {
        match self {
            SdoRequest::InitiateDownload { index, sub, .. } => (*index, *sub),
            SdoRequest::InitiateUpload { index, sub } => (*index, *sub),
        }
    }

    /// Serialize into an 8 byte frame
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut payload = [0; 8];
        match *self {
            SdoRequest::InitiateDownload {
                index,
                sub,
                len,
                data,
            } => {
                let n = 4 - len;
                // ccs=1, n unused bytes, expedited, size indicated
                payload[0] = (ClientCommand::InitiateDownload as u8) << 5 | (n << 2) | 0b11;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
        }
        payload
    }

    /// Create a CAN frame for this request
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        CanMessage::new(id, &self.to_bytes())
    }
}

impl TryFrom<&[u8]> for SdoRequest {
    type Error = SdoError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 8 {
            return TooShortSnafu { len: value.len() }.fail();
        }
        let index = u16::from_le_bytes([value[1], value[2]]);
        let sub = value[3];
        match value[0] {
            0x2F | 0x2B | 0x23 => {
                let len = 4 - ((value[0] >> 2) & 0x3);
                let mut data = [0; 4];
                data.copy_from_slice(&value[4..8]);
                Ok(SdoRequest::InitiateDownload {
                    index,
                    sub,
                    len,
                    data,
                })
            }
            0x40 => Ok(SdoRequest::InitiateUpload { index, sub }),
            other => InvalidCommandSnafu { value: other }.fail(),
        }
    }
}

/// An expedited SDO response received from a drive
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SdoResponse {
    /// A read response carrying the value
    ConfirmUpload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Number of valid bytes (1, 2 or 4)
        len: u8,
        /// Little endian value, unused bytes are zero
        data: [u8; 4],
    },
    /// A write acknowledgement
    ConfirmDownload {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
    },
    /// The server rejected the transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// Reason for the abort
        abort_code: u32,
    },
}

impl SdoResponse {
    /// Create an expedited upload response
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> Result<SdoResponse, SdoError> {
        match data.len() {
            1 | 2 | 4 => (),
            len => return UnsupportedLengthSnafu { len }.fail(),
        }
        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);
        Ok(SdoResponse::ConfirmUpload {
            index,
            sub,
            len: data.len() as u8,
            data: msg_data,
        })
    }

    /// Create a download acknowledgement
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, abort_code: u32) -> SdoResponse {
        SdoResponse::Abort {
            index,
            sub,
            abort_code,
        }
    }

    /// The addressed object
    pub fn object(&self) -> (u16, u8) {
        match self {
            SdoResponse::ConfirmUpload { index, sub, .. } => (*index, *sub),
            SdoResponse::ConfirmDownload { index, sub } => (*index, *sub),
            SdoResponse::Abort { index, sub, .. } => (*index, *sub),
        }
    }

    /// For upload responses, the value reconstructed as a signed 32-bit integer
    ///
    /// Values shorter than 4 bytes are zero extended.
    pub fn value(&self) -> Option<i32> {
        match self {
            SdoResponse::ConfirmUpload { data, .. } => Some(i32::from_le_bytes(*data)),
            _ => None,
        }
    }

    /// Serialize into an 8 byte frame
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut payload = [0; 8];
        match *self {
            SdoResponse::ConfirmUpload {
                index,
                sub,
                len,
                data,
            } => {
                let n = (4 - len) & 0x3;
                payload[0] = (ServerCommand::Upload as u8) << 5 | (n << 2) | 0b11;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        payload
    }

    /// Create a CAN frame for this response
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        CanMessage::new(id, &self.to_bytes())
    }
}

impl TryFrom<&[u8]> for SdoResponse {
    type Error = SdoError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let too_short = || TooShortSnafu { len: value.len() }.build();
        let cmd = *value.first().ok_or_else(too_short)?;
        let scs: ServerCommand = (cmd >> 5)
            .try_into()
            .map_err(|_| SdoError::InvalidCommand { value: cmd })?;

        let required = match scs {
            ServerCommand::Download => 4,
            ServerCommand::Upload | ServerCommand::Abort => 8,
        };
        if value.len() < required {
            return Err(too_short());
        }
        let index = u16::from_le_bytes([value[1], value[2]]);
        let sub = value[3];

        match scs {
            ServerCommand::Download => Ok(SdoResponse::ConfirmDownload { index, sub }),
            ServerCommand::Abort => {
                let abort_code = u32::from_le_bytes([value[4], value[5], value[6], value[7]]);
                Ok(SdoResponse::Abort {
                    index,
                    sub,
                    abort_code,
                })
            }
            ServerCommand::Upload => {
                let len = match cmd {
                    0x43 => 4,
                    0x4B => 2,
                    0x4F => 1,
                    other => return InvalidCommandSnafu { value: other }.fail(),
                };
                let mut data = [0; 4];
                data[0..len].copy_from_slice(&value[4..4 + len]);
                Ok(SdoResponse::ConfirmUpload {
                    index,
                    sub,
                    len: len as u8,
                    data,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expedited_download_command_bytes() {
        let req = SdoRequest::expedited_download(0x6060, 0, &[1]).unwrap();
        assert_eq!([0x2F, 0x60, 0x60, 0x00, 0x01, 0, 0, 0], req.to_bytes());

        let req = SdoRequest::expedited_download(0x6040, 0, &0x000Fu16.to_le_bytes()).unwrap();
        assert_eq!([0x2B, 0x40, 0x60, 0x00, 0x0F, 0x00, 0, 0], req.to_bytes());

        let req = SdoRequest::expedited_download(0x607A, 0, &(-2i32).to_le_bytes()).unwrap();
        assert_eq!([0x23, 0x7A, 0x60, 0x00, 0xFE, 0xFF, 0xFF, 0xFF], req.to_bytes());
    }

    #[test]
    fn test_unsupported_lengths() {
        assert_eq!(
            Err(SdoError::UnsupportedLength { len: 3 }),
            SdoRequest::expedited_download(0x6040, 0, &[1, 2, 3])
        );
        assert_eq!(
            Err(SdoError::UnsupportedLength { len: 0 }),
            SdoRequest::expedited_download(0x6040, 0, &[])
        );
        assert!(SdoRequest::expedited_download(0x6040, 0, &[0; 5]).is_err());
    }

    #[test]
    fn test_upload_request() {
        let msg = SdoRequest::initiate_upload(0x6064, 0).to_can_message(CanId::Std(0x602));
        assert_eq!(CanId::Std(0x602), msg.id());
        assert_eq!(&[0x40, 0x64, 0x60, 0x00, 0, 0, 0, 0], msg.data());
    }

    #[test]
    fn test_request_parse() {
        let bytes = [0x2B, 0x40, 0x60, 0x00, 0x0F, 0x00, 0, 0];
        assert_eq!(
            Ok(SdoRequest::InitiateDownload {
                index: 0x6040,
                sub: 0,
                len: 2,
                data: [0x0F, 0, 0, 0]
            }),
            SdoRequest::try_from(&bytes[..])
        );
        assert!(SdoRequest::try_from(&bytes[..4]).is_err());
    }

    #[test]
    fn test_response_decoding() {
        let ack = [0x60, 0x40, 0x60, 0x00, 0, 0, 0, 0];
        assert_eq!(
            Ok(SdoResponse::ConfirmDownload {
                index: 0x6040,
                sub: 0
            }),
            SdoResponse::try_from(&ack[..])
        );

        let position = [0x43, 0x64, 0x60, 0x00, 0x18, 0xFC, 0xFF, 0xFF];
        assert_eq!(Some(-1000), SdoResponse::try_from(&position[..]).unwrap().value());

        let statusword = [0x4B, 0x41, 0x60, 0x00, 0x37, 0x04, 0xAA, 0xBB];
        assert_eq!(Some(0x0437), SdoResponse::try_from(&statusword[..]).unwrap().value());

        let mode = [0x4F, 0x60, 0x60, 0x00, 0xFF, 0x11, 0x22, 0x33];
        assert_eq!(Some(0xFF), SdoResponse::try_from(&mode[..]).unwrap().value());

        let abort = [0x80, 0x7A, 0x60, 0x00, 0x00, 0x00, 0x02, 0x06];
        assert_eq!(
            Ok(SdoResponse::Abort {
                index: 0x607A,
                sub: 0,
                abort_code: 0x0602_0000
            }),
            SdoResponse::try_from(&abort[..])
        );
        assert_eq!(Some(AbortCode::NoSuchObject), AbortCode::from_raw(0x0602_0000));
    }

    #[test]
    fn test_malformed_responses() {
        // 3 byte uploads are not used by any register
        let three = [0x47, 0x64, 0x60, 0x00, 1, 2, 3, 0];
        assert_eq!(
            Err(SdoError::InvalidCommand { value: 0x47 }),
            SdoResponse::try_from(&three[..])
        );
        let short_upload = [0x43, 0x64, 0x60, 0x00, 1, 2];
        assert_eq!(
            Err(SdoError::TooShort { len: 6 }),
            SdoResponse::try_from(&short_upload[..])
        );
        let short_ack = [0x60, 0x40];
        assert!(SdoResponse::try_from(&short_ack[..]).is_err());
        assert!(SdoResponse::try_from(&[][..]).is_err());
    }

    #[test]
    fn test_response_encoding() {
        let resp = SdoResponse::expedited_upload(0x6041, 0, &0x0400u16.to_le_bytes()).unwrap();
        assert_eq!([0x4B, 0x41, 0x60, 0x00, 0x00, 0x04, 0, 0], resp.to_bytes());
        assert_eq!(
            [0x60, 0x83, 0x60, 0x00, 0, 0, 0, 0],
            SdoResponse::download_acknowledge(0x6083, 0).to_bytes()
        );
    }
}
