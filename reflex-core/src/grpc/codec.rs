//! # Dynamic Message Codec
//!
//! Implements `tonic::codec::Codec` for `prost_reflect::DynamicMessage`, so that `tonic` can carry
//! messages whose type is only known at runtime.
//!
//! JSON is handled one level up, by the bridge: the codec only ever sees already-typed messages.
//!
//! 1. **Encoder**: writes the message's Protobuf encoding into the gRPC frame.
//! 2. **Decoder**: merges the frame into a fresh message of the method's output type.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A codec bound to the request and response types of one method.
pub struct DynamicCodec {
    res_desc: MessageDescriptor,
}

impl DynamicCodec {
    /// Only the response descriptor is kept: requests already carry their own.
    pub fn new(res_desc: MessageDescriptor) -> Self {
        Self { res_desc }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.res_desc.clone())
    }
}

pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

/// Decodes Protobuf bytes into a message of the wrapped type.
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.0.clone());
        msg.merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {}", e)))?;

        Ok(Some(msg))
    }
}
