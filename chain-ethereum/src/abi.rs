//! ABI glue for the escrow contract (spec.md §6 "AMB adapter (plug-in contract)").
//!
//! The escrow contract is a generic AMB incentives contract: it emits one event per
//! `BountyEvent` variant and exposes two entrypoints relayers call, `deliverMessage` and
//! `acknowledgeMessage`. Event and function signatures are fixed here rather than pulled in
//! via `ethers::contract::abigen!` because this crate only ever decodes/encodes this single
//! ABI — a generated binding would just be more code for the same four events.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Bytes, H256, U256};
use ethers_core::utils::keccak256;
use once_cell::sync::Lazy;
use relay_core::{
    BountyClaimed, BountyEvent, BountyIncreased, BountyPlaced, ChainCommunicationError,
    ChainId, ChainResult, EventPosition, MessageDelivered, MessageId,
};

fn topic0(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

pub static BOUNTY_PLACED_TOPIC: Lazy<H256> = Lazy::new(|| {
    topic0("BountyPlaced(bytes32,uint256,bytes32,uint256,uint256,bytes32,uint256,uint256,uint256,bytes)")
});
pub static BOUNTY_INCREASED_TOPIC: Lazy<H256> =
    Lazy::new(|| topic0("BountyIncreased(bytes32,uint256,uint256)"));
pub static MESSAGE_DELIVERED_TOPIC: Lazy<H256> =
    Lazy::new(|| topic0("MessageDelivered(bytes32,uint256)"));
pub static BOUNTY_CLAIMED_TOPIC: Lazy<H256> = Lazy::new(|| topic0("BountyClaimed(bytes32)"));

pub static DELIVER_MESSAGE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&keccak256(b"deliverMessage(bytes32,bytes)")[..4]);
    sel
});
pub static ACKNOWLEDGE_MESSAGE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&keccak256(b"acknowledgeMessage(bytes32)")[..4]);
    sel
});

fn decode_err(e: impl std::fmt::Display) -> ChainCommunicationError {
    ChainCommunicationError::DecodeError(e.to_string())
}

/// Decode a raw log's topics+data into a `BountyEvent`, given it already matched one of the
/// four topic0 hashes above. `mid` comes from `topics[1]` (the only indexed parameter on
/// every event) per spec.md's "opaque fixed-width byte string (32 bytes)" identifier.
pub fn decode_bounty_event(
    topic0_hash: H256,
    topics: &[H256],
    data: &[u8],
    position: EventPosition,
) -> ChainResult<Option<BountyEvent>> {
    let mid = match topics.get(1) {
        Some(t) => MessageId(*t),
        None => return Ok(None),
    };

    if topic0_hash == *BOUNTY_PLACED_TOPIC {
        let types = [
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Bytes,
        ];
        let tokens = abi::decode(&types, data).map_err(decode_err)?;
        let mut it = tokens.into_iter();
        let from_chain_id = as_u256(it.next())?.as_u32();
        let incentives_address = as_fixed_bytes32(it.next())?;
        let max_gas_delivery = as_u256(it.next())?;
        let max_gas_ack = as_u256(it.next())?;
        let refund_gas_to = as_fixed_bytes32(it.next())?;
        let price_of_delivery_gas = as_u256(it.next())?;
        let price_of_ack_gas = as_u256(it.next())?;
        let target_delta = as_u256(it.next())?;
        let payload = as_bytes(it.next())?;

        Ok(Some(BountyEvent::BountyPlaced(BountyPlaced {
            mid,
            from_chain_id: ChainId(from_chain_id),
            incentives_address,
            max_gas_delivery,
            max_gas_ack,
            refund_gas_to,
            price_of_delivery_gas,
            price_of_ack_gas,
            target_delta,
            payload,
            position,
        })))
    } else if topic0_hash == *BOUNTY_INCREASED_TOPIC {
        let types = [ParamType::Uint(256), ParamType::Uint(256)];
        let tokens = abi::decode(&types, data).map_err(decode_err)?;
        let mut it = tokens.into_iter();
        let new_price_of_delivery_gas = as_u256(it.next())?;
        let new_price_of_ack_gas = as_u256(it.next())?;
        Ok(Some(BountyEvent::BountyIncreased(BountyIncreased {
            mid,
            new_price_of_delivery_gas,
            new_price_of_ack_gas,
            position,
        })))
    } else if topic0_hash == *MESSAGE_DELIVERED_TOPIC {
        let types = [ParamType::Uint(256)];
        let tokens = abi::decode(&types, data).map_err(decode_err)?;
        let to_chain_id = as_u256(tokens.into_iter().next())?.as_u32();
        Ok(Some(BountyEvent::MessageDelivered(MessageDelivered {
            mid,
            to_chain_id: ChainId(to_chain_id),
            position,
        })))
    } else if topic0_hash == *BOUNTY_CLAIMED_TOPIC {
        Ok(Some(BountyEvent::BountyClaimed(BountyClaimed {
            mid,
            position,
        })))
    } else {
        // Unrecognized topic (spec.md §4.2): not one of ours, ignore.
        Ok(None)
    }
}

pub fn encode_deliver_message(mid: MessageId, payload: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(4 + 32 + 32 + payload.len());
    out.extend_from_slice(&*DELIVER_MESSAGE_SELECTOR);
    out.extend_from_slice(&abi::encode(&[
        Token::FixedBytes(mid.as_bytes().to_vec()),
        Token::Bytes(payload.to_vec()),
    ]));
    out.into()
}

pub fn encode_acknowledge_message(mid: MessageId) -> Bytes {
    let mut out = Vec::with_capacity(4 + 32);
    out.extend_from_slice(&*ACKNOWLEDGE_MESSAGE_SELECTOR);
    out.extend_from_slice(&abi::encode(&[Token::FixedBytes(mid.as_bytes().to_vec())]));
    out.into()
}

fn as_u256(token: Option<Token>) -> ChainResult<U256> {
    token
        .and_then(|t| t.into_uint())
        .ok_or_else(|| ChainCommunicationError::DecodeError("expected uint256".into()))
}

fn as_bytes(token: Option<Token>) -> ChainResult<Vec<u8>> {
    token
        .and_then(|t| t.into_bytes())
        .ok_or_else(|| ChainCommunicationError::DecodeError("expected bytes".into()))
}

fn as_fixed_bytes32(token: Option<Token>) -> ChainResult<H256> {
    let bytes = token
        .and_then(|t| t.into_fixed_bytes())
        .ok_or_else(|| ChainCommunicationError::DecodeError("expected bytes32".into()))?;
    Ok(H256::from_slice(&bytes))
}
