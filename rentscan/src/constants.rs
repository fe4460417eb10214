// rentscan/src/constants.rs
//! Protocol and identity constants shared by the central and its peers

use uuid::Uuid;

/// RentScan primary service: 18ee2ef5-263d-4559-953c-d66077c89ae6
pub const RENTSCAN_SERVICE_UUID: Uuid = Uuid::from_u128(0x18ee2ef5_263d_4559_953c_d66077c89ae6);

/// RX characteristic (central writes here): ...ae7
pub const RENTSCAN_RX_UUID: Uuid = Uuid::from_u128(0x18ee2ef5_263d_4559_953c_d66077c89ae7);

/// TX characteristic (peripheral notifies here): ...ae8
pub const RENTSCAN_TX_UUID: Uuid = Uuid::from_u128(0x18ee2ef5_263d_4559_953c_d66077c89ae8);

/// Client Characteristic Configuration descriptor (0x2902)
pub const CCC_UUID: Uuid = uuid_from_u16(0x2902);

/// Complete local name advertised by the main device
pub const RENTSCAN_DEVICE_NAME: &str = "RentScan";

/// Maximum tag id length carried in a message
pub const MAX_TAG_ID_LEN: usize = 16;

/// Maximum opaque payload length carried in a message
pub const MAX_MSG_PAYLOAD: usize = 128;

/// Scan interval / window in 0.625 ms units (50 ms / 30 ms)
pub const BLE_SCAN_INTERVAL: u16 = 0x0050;
pub const BLE_SCAN_WINDOW: u16 = 0x0030;

/// Initial connection interval range in 1.25 ms units (30 ms - 50 ms)
pub const BLE_CONN_INTERVAL_MIN: u16 = 0x0018;
pub const BLE_CONN_INTERVAL_MAX: u16 = 0x0028;

/// Supervision timeout in 10 ms units (4 s)
pub const BLE_CONN_SUPERVISION_TIMEOUT: u16 = 400;

/// Consecutive message-processing errors before the stack is reset
pub const GATEWAY_ERROR_RESET_THRESHOLD: u32 = 5;

/// Bluetooth base UUID used to expand 16-bit assigned numbers.
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG assigned number into a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Canonical on-wire byte order for 128-bit UUIDs (little-endian, i.e. the
/// textual form reversed), as carried in advertising data and ATT PDUs.
pub fn uuid_to_wire(uuid: &Uuid) -> [u8; 16] {
    uuid.as_u128().to_le_bytes()
}

/// Inverse of [`uuid_to_wire`].
pub fn uuid_from_wire(bytes: [u8; 16]) -> Uuid {
    Uuid::from_u128(u128::from_le_bytes(bytes))
}
