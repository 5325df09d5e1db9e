use std::fmt::{Display, Formatter};

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};


/// Discriminator in the first two bytes of every frame header.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum MessageKind {
    SyncRequest = 0,
    SyncResponse = 1,
    /// reserved by the middleware, never sent to clients
    AsyncEvent = 2,
    AsyncSend = 3,
    AsyncRecv = 4,
    CumulativeAck = 5,
    Retransmit = 6,
}

/// Function identifiers carried in `field1` of a sync request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum FunctionId {
    CreateSocket = 0x0001,
    DeleteSocket = 0x0002,
    CreateSendStream = 0x0003,
    Join = 0x0004,
    Leave = 0x0005,
    SetTtl = 0x0006,
    GetSockInterfaces = 0x0007,
    AddSockInterface = 0x0008,
    DelSockInterface = 0x0009,
    SetSockInterfaces = 0x000A,

    GetInterfaces = 0x0100,
    GroupSet = 0x0101,
    NeighborSet = 0x0102,
    ChildrenSet = 0x0103,
    ParentSet = 0x0104,
    DesignatedHost = 0x0105,
}

impl FunctionId {
    /// name of the operation as reported in middleware errors
    pub fn operation_name(&self) -> &'static str {
        match self {
            FunctionId::CreateSocket => "createSocket",
            FunctionId::DeleteSocket => "deleteSocket",
            FunctionId::CreateSendStream => "createSendStream",
            FunctionId::Join => "join",
            FunctionId::Leave => "leave",
            FunctionId::SetTtl => "setTtl",
            FunctionId::GetSockInterfaces => "getSockInterfaces",
            FunctionId::AddSockInterface => "addSockInterface",
            FunctionId::DelSockInterface => "delSockInterface",
            FunctionId::SetSockInterfaces => "setSockInterfaces",
            FunctionId::GetInterfaces => "getInterfaces",
            FunctionId::GroupSet => "groupSet",
            FunctionId::NeighborSet => "neighborSet",
            FunctionId::ChildrenSet => "childrenSet",
            FunctionId::ParentSet => "parentSet",
            FunctionId::DesignatedHost => "designatedHost",
        }
    }
}

/// Error code in `field1` of a sync response. Codes this client does not know are preserved.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum ErrorCode {
    None = 0,
    RequirementFailed = 1,
    InternalInterfaceError = 2,
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl From<ErrorCode> for u16 {
    fn from(value: ErrorCode) -> u16 {
        match value {
            ErrorCode::None => 0,
            ErrorCode::RequirementFailed => 1,
            ErrorCode::InternalInterfaceError => 2,
            ErrorCode::Unknown(code) => code,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::None => write!(f, "none"),
            ErrorCode::RequirementFailed => write!(f, "requirement failed"),
            ErrorCode::InternalInterfaceError => write!(f, "internal interface error"),
            ErrorCode::Unknown(code) => write!(f, "unknown error {}", code),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::sync_request(0, Some(MessageKind::SyncRequest))]
    #[case::async_event(2, Some(MessageKind::AsyncEvent))]
    #[case::retransmit(6, Some(MessageKind::Retransmit))]
    #[case::unknown(7, None)]
    #[case::max(u16::MAX, None)]
    fn test_message_kind(#[case] raw: u16, #[case] expected: Option<MessageKind>) {
        assert_eq!(MessageKind::try_from(raw).ok(), expected);
    }

    #[rstest]
    #[case(0x0001, FunctionId::CreateSocket, "createSocket")]
    #[case(0x000A, FunctionId::SetSockInterfaces, "setSockInterfaces")]
    #[case(0x0100, FunctionId::GetInterfaces, "getInterfaces")]
    #[case(0x0105, FunctionId::DesignatedHost, "designatedHost")]
    fn test_function_id(#[case] raw: u16, #[case] expected: FunctionId, #[case] name: &str) {
        assert_eq!(FunctionId::try_from(raw).unwrap(), expected);
        assert_eq!(u16::from(expected), raw);
        assert_eq!(expected.operation_name(), name);
    }

    #[rstest]
    #[case(0, ErrorCode::None)]
    #[case(1, ErrorCode::RequirementFailed)]
    #[case(2, ErrorCode::InternalInterfaceError)]
    #[case(99, ErrorCode::Unknown(99))]
    fn test_error_code(#[case] raw: u16, #[case] expected: ErrorCode) {
        assert_eq!(ErrorCode::from(raw), expected);
        assert_eq!(u16::from(expected), raw);
    }
}
