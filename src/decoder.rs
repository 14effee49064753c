// src/decoder.rs
use alloy::primitives::{Address, U256};
use thiserror::Error;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// A decoded ERC20 Transfer: indexed from/to plus the raw uint256 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub sender: Address,
    pub receiver: Address,
    pub raw_value: U256,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected 3 topics, got {0}")]
    TopicCount(usize),
    #[error("topic0 {0} is not the Transfer signature")]
    SignatureMismatch(String),
    #[error("topic is not a 32-byte hex word: {0}")]
    InvalidTopic(String),
    #[error("log has no data field")]
    MissingData,
    #[error("data is not a uint256 hex word: {0}")]
    InvalidData(String),
}

/// topics[1] and topics[2] are 32-byte (padded) hex words; the address is
/// the last 20 bytes.
fn topic_to_address(topic: &str) -> Result<Address, DecodeError> {
    let s = topic.trim_start_matches("0x");
    let bytes = hex::decode(s).map_err(|_| DecodeError::InvalidTopic(topic.to_string()))?;
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidTopic(topic.to_string()));
    }
    let addr_bytes: [u8; 20] = bytes[12..32]
        .try_into()
        .map_err(|_| DecodeError::InvalidTopic(topic.to_string()))?;
    Ok(Address::from(addr_bytes))
}

/// Decode one log's topics/data against the canonical Transfer signature.
pub fn decode_transfer(topics: &[String], data: Option<&str>) -> Result<DecodedTransfer, DecodeError> {
    if topics.len() != 3 {
        return Err(DecodeError::TopicCount(topics.len()));
    }
    if !topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return Err(DecodeError::SignatureMismatch(topics[0].clone()));
    }

    let sender = topic_to_address(&topics[1])?;
    let receiver = topic_to_address(&topics[2])?;

    let data = data.ok_or(DecodeError::MissingData)?;
    let value_hex = data.trim_start_matches("0x");
    let bytes =
        hex::decode(value_hex).map_err(|_| DecodeError::InvalidData(data.to_string()))?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(DecodeError::InvalidData(data.to_string()));
    }
    let raw_value = U256::from_be_slice(&bytes);

    Ok(DecodedTransfer {
        sender,
        receiver,
        raw_value,
    })
}

/// Lower-cased `0x…` form used everywhere addresses are stored or compared.
pub fn address_lc(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_for(addr: &str) -> String {
        format!("0x{:0>64}", addr.trim_start_matches("0x"))
    }

    fn valid_topics() -> Vec<String> {
        vec![
            TRANSFER_TOPIC.to_string(),
            topic_for("0x1111111111111111111111111111111111111111"),
            topic_for("0x2222222222222222222222222222222222222222"),
        ]
    }

    #[test]
    fn decodes_well_formed_log() {
        let data = format!("0x{:064x}", 5_000_000u64);
        let decoded = decode_transfer(&valid_topics(), Some(&data)).expect("decodes");
        assert_eq!(
            address_lc(&decoded.sender),
            "0x1111111111111111111111111111111111111111"
        );
        assert_eq!(
            address_lc(&decoded.receiver),
            "0x2222222222222222222222222222222222222222"
        );
        assert_eq!(decoded.raw_value, U256::from(5_000_000u64));
    }

    #[test]
    fn rejects_wrong_topic_count() {
        let topics = vec![TRANSFER_TOPIC.to_string()];
        assert!(matches!(
            decode_transfer(&topics, Some("0x00")),
            Err(DecodeError::TopicCount(1))
        ));
    }

    #[test]
    fn rejects_foreign_signature() {
        let mut topics = valid_topics();
        topics[0] =
            "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925".to_string(); // Approval
        assert!(matches!(
            decode_transfer(&topics, Some("0x00")),
            Err(DecodeError::SignatureMismatch(_))
        ));
    }

    #[test]
    fn rejects_non_hex_data() {
        assert!(matches!(
            decode_transfer(&valid_topics(), Some("0xzznothex")),
            Err(DecodeError::InvalidData(_))
        ));
    }

    #[test]
    fn rejects_missing_data() {
        assert!(matches!(
            decode_transfer(&valid_topics(), None),
            Err(DecodeError::MissingData)
        ));
    }

    #[test]
    fn rejects_short_topic() {
        let mut topics = valid_topics();
        topics[1] = "0x1111".to_string();
        assert!(matches!(
            decode_transfer(&topics, Some("0x00")),
            Err(DecodeError::InvalidTopic(_))
        ));
    }

    #[test]
    fn decodes_max_uint256_value() {
        let data = format!("0x{}", "f".repeat(64));
        let decoded = decode_transfer(&valid_topics(), Some(&data)).expect("decodes");
        assert_eq!(decoded.raw_value, U256::MAX);
    }
}
