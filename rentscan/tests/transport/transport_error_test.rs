use rentscan::{Error, TransportError};

#[test]
fn errno_values_map_to_kinds() {
    let cases = [
        (-2, TransportError::NotFound),
        (-11, TransportError::Busy),
        (-12, TransportError::NoMemory),
        (-22, TransportError::InvalidArgument),
        (-95, TransportError::NotSupported),
        (-128, TransportError::NotConnected),
        (-114, TransportError::AlreadySubscribed),
        (-99, TransportError::Os(-99)),
    ];
    for (errno, kind) in cases {
        assert_eq!(TransportError::from_errno(errno), kind, "errno {}", errno);
    }
}

#[test]
fn only_resource_exhaustion_is_transient() {
    assert!(TransportError::Busy.is_transient());
    assert!(TransportError::NoMemory.is_transient());
    assert!(!TransportError::StaleConnection.is_transient());
    assert!(!TransportError::Hci(0x0b).is_transient());
    assert!(TransportError::Hci(0x0b).is_stale_state());
}

#[test]
fn crate_error_wraps_transport_error() {
    let err: Error = TransportError::Att(0x0e).into();
    assert!(matches!(err, Error::Transport(TransportError::Att(0x0e))));
    assert_eq!(err.to_string(), "transport error: att error 0x0e");
}
