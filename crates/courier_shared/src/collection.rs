//! # Collection Replication Packets
//!
//! ```text
//!  OBSERVER                                   OWNER
//!     │── ResolveCollection{name} ─────────────►│
//!     │◄──────────────────── answer CollectionId │
//!     │── ObserveCollection{id, registration} ──►│  join validator
//!     │◄─────────── answer CollectionSnapshot    │  (or failure JoinRejection)
//!     │◄──────────────── CollectionAdd / Remove  │  deltas, in call order
//!     │◄──────────────── CollectionClear         │
//!     │── LeaveCollection{id} ──────────────────►│
//!     │◄──────────────── CollectionClosed        │  owner unbound
//! ```
//!
//! Items travel as [`Blob`]s: only the two endpoints know the item type.

use courier_core::{Blob, DecodeError, DecodeResult, ReadCursor, Wire, WriteCursor};

use crate::protocol::{CollectionId, Message, Packet, Request};

// =============================================================================
// REQUESTS
// =============================================================================

/// Looks up a collection id by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveCollection {
    /// Name the owner bound the collection under.
    pub name: String,
}

/// Subscribes to a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObserveCollection {
    /// The collection.
    pub collection: CollectionId,
    /// Application data handed to the owner's join validator.
    pub registration: Blob,
}

/// Full contents of a collection at subscribe time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionSnapshot {
    /// A `Vec<T>` of items.
    pub items: Blob,
}

/// Why a subscribe or resolve was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinRejection {
    /// No collection is bound under that id or name.
    UnknownCollection,
    /// The join validator refused, with application detail.
    Rejected(Blob),
}

impl Packet for ResolveCollection {
    const NAME: &'static str = "courier.collection.Resolve";
}

impl Request for ResolveCollection {
    type Answer = CollectionId;
    type Failure = JoinRejection;
}

impl Wire for ResolveCollection {
    fn encode(&self, writer: &mut WriteCursor) {
        self.name.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        String::decode(reader).map(|name| Self { name })
    }
}

impl Packet for ObserveCollection {
    const NAME: &'static str = "courier.collection.Observe";
}

impl Request for ObserveCollection {
    type Answer = CollectionSnapshot;
    type Failure = JoinRejection;
}

impl Wire for ObserveCollection {
    fn encode(&self, writer: &mut WriteCursor) {
        self.collection.encode(writer);
        self.registration.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            collection: CollectionId::decode(reader)?,
            registration: Blob::decode(reader)?,
        })
    }
}

impl Wire for CollectionSnapshot {
    fn encode(&self, writer: &mut WriteCursor) {
        self.items.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Blob::decode(reader).map(|items| Self { items })
    }
}

impl Wire for JoinRejection {
    fn encode(&self, writer: &mut WriteCursor) {
        match self {
            Self::UnknownCollection => writer.write_u8(0),
            Self::Rejected(detail) => {
                writer.write_u8(1);
                detail.encode(writer);
            }
        }
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        match reader.read_u8()? {
            0 => Ok(Self::UnknownCollection),
            1 => Blob::decode(reader).map(Self::Rejected),
            tag => Err(DecodeError::InvalidTag {
                tag: u32::from(tag),
                what: "JoinRejection",
            }),
        }
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Observer → owner: stop sending deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaveCollection {
    /// The collection.
    pub collection: CollectionId,
}

/// Owner → observer: an item was appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionAdd {
    /// The collection.
    pub collection: CollectionId,
    /// The encoded item.
    pub item: Blob,
}

/// Owner → observer: the first item equal to this one was removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionRemove {
    /// The collection.
    pub collection: CollectionId,
    /// The encoded item.
    pub item: Blob,
}

/// Owner → observer: every item was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionClear {
    /// The collection.
    pub collection: CollectionId,
}

/// Owner → observer: the collection was unbound. No more deltas follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionClosed {
    /// The collection.
    pub collection: CollectionId,
}

impl Packet for LeaveCollection {
    const NAME: &'static str = "courier.collection.Leave";
}

impl Message for LeaveCollection {}

impl Wire for LeaveCollection {
    fn encode(&self, writer: &mut WriteCursor) {
        self.collection.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        CollectionId::decode(reader).map(|collection| Self { collection })
    }
}

impl Packet for CollectionAdd {
    const NAME: &'static str = "courier.collection.Add";
}

impl Message for CollectionAdd {}

impl Wire for CollectionAdd {
    fn encode(&self, writer: &mut WriteCursor) {
        self.collection.encode(writer);
        self.item.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            collection: CollectionId::decode(reader)?,
            item: Blob::decode(reader)?,
        })
    }
}

impl Packet for CollectionRemove {
    const NAME: &'static str = "courier.collection.Remove";
}

impl Message for CollectionRemove {}

impl Wire for CollectionRemove {
    fn encode(&self, writer: &mut WriteCursor) {
        self.collection.encode(writer);
        self.item.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        Ok(Self {
            collection: CollectionId::decode(reader)?,
            item: Blob::decode(reader)?,
        })
    }
}

impl Packet for CollectionClear {
    const NAME: &'static str = "courier.collection.Clear";
}

impl Message for CollectionClear {}

impl Wire for CollectionClear {
    fn encode(&self, writer: &mut WriteCursor) {
        self.collection.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        CollectionId::decode(reader).map(|collection| Self { collection })
    }
}

impl Packet for CollectionClosed {
    const NAME: &'static str = "courier.collection.Closed";
}

impl Message for CollectionClosed {}

impl Wire for CollectionClosed {
    fn encode(&self, writer: &mut WriteCursor) {
        self.collection.encode(writer);
    }

    fn decode(reader: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        CollectionId::decode(reader).map(|collection| Self { collection })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{from_bytes, to_bytes};

    #[test]
    fn test_rejection_detail_survives() {
        let rejection = JoinRejection::Rejected(Blob::encode_from(&"room full".to_owned()));
        let back: JoinRejection = from_bytes(&to_bytes(&rejection)).unwrap();
        match back {
            JoinRejection::Rejected(detail) => {
                assert_eq!(detail.decode_as::<String>().unwrap(), "room full");
            }
            JoinRejection::UnknownCollection => panic!("detail lost"),
        }
        assert!(from_bytes::<JoinRejection>(&[2]).is_err());
    }

    #[test]
    fn test_snapshot_carries_typed_items() {
        let snapshot = CollectionSnapshot {
            items: Blob::encode_from(&vec![1u32, 2, 3]),
        };
        let back: CollectionSnapshot = from_bytes(&to_bytes(&snapshot)).unwrap();
        assert_eq!(back.items.decode_as::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_packet_names_distinct() {
        let ids = [
            ResolveCollection::TYPE_ID,
            ObserveCollection::TYPE_ID,
            LeaveCollection::TYPE_ID,
            CollectionAdd::TYPE_ID,
            CollectionRemove::TYPE_ID,
            CollectionClear::TYPE_ID,
            CollectionClosed::TYPE_ID,
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
