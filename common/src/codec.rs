// 帧封装格式
//
// 线上布局：[4字节大端元数据长度][元数据JSON][负载]
//
// 元数据JSON为 {"metadata": {...}, "data_size": N}，与现有节点互通。
// 解码是全有或全无的：任何一步失败都不返回部分结果。

use crate::error::{CodecError, Result};
use crate::types::FrameMetadata;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// 长度前缀字节数
pub const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Serialize)]
struct FramePackageRef<'a> {
    metadata: &'a FrameMetadata,
    data_size: usize,
}

#[derive(Deserialize)]
struct FramePackage {
    metadata: FrameMetadata,
    data_size: usize,
}

/// 编码一帧
///
/// 只会在元数据序列化失败时返回错误，负载大小不受限制。
pub fn encode(metadata: &FrameMetadata, payload: &[u8]) -> Result<Bytes> {
    let header = serde_json::to_vec(&FramePackageRef {
        metadata,
        data_size: payload.len(),
    })
    .map_err(CodecError::MetadataSerialize)?;

    let header_len =
        u32::try_from(header.len()).map_err(|_| CodecError::MetadataTooLarge(header.len()))?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + header.len() + payload.len());
    buf.put_u32(header_len);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);

    Ok(buf.freeze())
}

/// 解码一帧，返回元数据和零拷贝的负载切片
pub fn decode(buffer: &Bytes) -> Result<(FrameMetadata, Bytes)> {
    if buffer.len() < LENGTH_PREFIX_SIZE {
        return Err(CodecError::FrameTooShort { len: buffer.len() });
    }

    let declared = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    let available = buffer.len() - LENGTH_PREFIX_SIZE;
    if declared > available {
        return Err(CodecError::MetadataLengthMismatch {
            declared,
            available,
        });
    }

    let header_end = LENGTH_PREFIX_SIZE + declared;
    let package: FramePackage = serde_json::from_slice(&buffer[LENGTH_PREFIX_SIZE..header_end])
        .map_err(CodecError::MetadataParse)?;

    let payload = buffer.slice(header_end..);
    for expected in [package.metadata.payload_size, package.data_size] {
        if payload.len() != expected {
            return Err(CodecError::PayloadSizeMismatch {
                expected,
                actual: payload.len(),
            });
        }
    }

    Ok((package.metadata, payload))
}

/// 读取长度前缀声明的元数据长度（不解析元数据）
pub fn declared_metadata_len(buffer: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buffer.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaType, Quality};
    use chrono::Utc;

    fn metadata(frame_id: u64, payload_size: usize) -> FrameMetadata {
        FrameMetadata {
            frame_id,
            timestamp: Utc::now(),
            media_type: MediaType::Video,
            codec_name: "h264".to_string(),
            quality: Quality::Hd720,
            bitrate: Quality::Hd720.bitrate(),
            profile: "baseline".to_string(),
            payload_size,
        }
    }

    #[test]
    fn test_round_trip() {
        let payload: Vec<u8> = (0..100u8).collect();
        let meta = metadata(1, payload.len());

        let encoded = encode(&meta, &payload).unwrap();
        let (decoded_meta, decoded_payload) = decode(&encoded).unwrap();

        assert_eq!(decoded_meta, meta);
        assert_eq!(&decoded_payload[..], &payload[..]);
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let meta = metadata(42, 0);
        let encoded = encode(&meta, &[]).unwrap();
        let (decoded_meta, decoded_payload) = decode(&encoded).unwrap();

        assert_eq!(decoded_meta, meta);
        assert!(decoded_payload.is_empty());
    }

    #[test]
    fn test_layout_is_length_prefixed() {
        let payload = vec![0xABu8; 100];
        let meta = metadata(3, payload.len());
        let encoded = encode(&meta, &payload).unwrap();

        let header_len = declared_metadata_len(&encoded).unwrap();
        assert_eq!(encoded.len(), LENGTH_PREFIX_SIZE + header_len + payload.len());
        assert_eq!(
            &encoded[..LENGTH_PREFIX_SIZE],
            &(header_len as u32).to_be_bytes()[..]
        );

        let header: serde_json::Value =
            serde_json::from_slice(&encoded[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + header_len])
                .unwrap();
        assert_eq!(header["data_size"], 100);
        assert_eq!(header["metadata"]["frame_id"], 3);
        assert_eq!(header["metadata"]["quality"], "720p");
        assert_eq!(&encoded[LENGTH_PREFIX_SIZE + header_len..], &payload[..]);
    }

    #[test]
    fn test_decode_too_short() {
        for len in 0..LENGTH_PREFIX_SIZE {
            let buffer = Bytes::from(vec![0u8; len]);
            assert!(matches!(
                decode(&buffer),
                Err(CodecError::FrameTooShort { len: l }) if l == len
            ));
        }
    }

    #[test]
    fn test_decode_truncated_metadata() {
        let payload = vec![1u8; 100];
        let encoded = encode(&metadata(1, payload.len()), &payload).unwrap();
        let header_len = declared_metadata_len(&encoded).unwrap();

        // 截断到元数据中间
        let truncated = encoded.slice(..LENGTH_PREFIX_SIZE + header_len / 2);
        match decode(&truncated) {
            Err(CodecError::MetadataLengthMismatch {
                declared,
                available,
            }) => {
                assert_eq!(declared, header_len);
                assert_eq!(available, header_len / 2);
            }
            other => panic!("Expected MetadataLengthMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_payload_shortened() {
        let payload = vec![1u8; 100];
        let encoded = encode(&metadata(1, payload.len()), &payload).unwrap();

        let shortened = encoded.slice(..encoded.len() - 1);
        assert!(matches!(
            decode(&shortened),
            Err(CodecError::PayloadSizeMismatch {
                expected: 100,
                actual: 99
            })
        ));
    }

    #[test]
    fn test_decode_payload_lengthened() {
        let payload = vec![1u8; 100];
        let encoded = encode(&metadata(1, payload.len()), &payload).unwrap();

        let mut lengthened = BytesMut::from(&encoded[..]);
        lengthened.extend_from_slice(&[0xFF, 0xFF]);
        assert!(matches!(
            decode(&lengthened.freeze()),
            Err(CodecError::PayloadSizeMismatch {
                expected: 100,
                actual: 102
            })
        ));
    }

    #[test]
    fn test_decode_garbage_metadata() {
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.extend_from_slice(b"nope!");
        buf.extend_from_slice(&[0u8; 10]);

        assert!(matches!(
            decode(&buf.freeze()),
            Err(CodecError::MetadataParse(_))
        ));
    }

    #[test]
    fn test_decode_size_field_disagrees_with_data_size() {
        // metadata.size 与 data_size 不一致时同样拒绝
        let header = br#"{"metadata":{"frame_id":9,"timestamp":"2024-05-01T10:00:00Z","type":"video","codec":"h264","quality":"1080p","bitrate":4000000,"profile":"baseline","size":3},"data_size":4}"#;
        let mut buf = BytesMut::new();
        buf.put_u32(header.len() as u32);
        buf.extend_from_slice(header);
        buf.extend_from_slice(&[1, 2, 3, 4]);

        assert!(matches!(
            decode(&buf.freeze()),
            Err(CodecError::PayloadSizeMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_decode_frame_from_existing_node() {
        let header = br#"{"metadata":{"frame_id":12,"timestamp":"2024-05-01T10:00:00.123456789Z","type":"video","codec":"h264","quality":"1080p","bitrate":4000000,"profile":"baseline","size":4},"data_size":4}"#;
        let mut buf = BytesMut::new();
        buf.put_u32(header.len() as u32);
        buf.extend_from_slice(header);
        buf.extend_from_slice(&[0, 0, 0, 1]);

        let (meta, payload) = decode(&buf.freeze()).unwrap();
        assert_eq!(meta.frame_id, 12);
        assert_eq!(meta.quality, Quality::FullHd1080);
        assert_eq!(meta.media_type, MediaType::Video);
        assert_eq!(meta.payload_size, 4);
        assert_eq!(&payload[..], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_declared_metadata_len_short_buffer() {
        assert_eq!(declared_metadata_len(&[0, 0, 1]), None);
        assert_eq!(declared_metadata_len(&[0, 0, 1, 0, 9]), Some(256));
    }

    mod properties {
        use super::*;
        use chrono::{DateTime, TimeZone};
        use proptest::prelude::*;

        fn any_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
            (0i64..4_102_444_800, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
                Utc.timestamp_opt(secs, nanos).single().unwrap()
            })
        }

        fn any_frame() -> impl Strategy<Value = (FrameMetadata, Vec<u8>)> {
            (
                any::<u64>(),
                any_timestamp(),
                prop::sample::select(vec![MediaType::Video, MediaType::Audio, MediaType::Metadata]),
                "\\PC{0,24}",
                prop::sample::select(Quality::ALL.to_vec()),
                "\\PC{0,24}",
                prop::collection::vec(any::<u8>(), 0..512),
            )
                .prop_map(|(frame_id, timestamp, media_type, codec_name, quality, profile, payload)| {
                    let metadata = FrameMetadata {
                        frame_id,
                        timestamp,
                        media_type,
                        codec_name,
                        quality,
                        bitrate: quality.bitrate(),
                        profile,
                        payload_size: payload.len(),
                    };
                    (metadata, payload)
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn test_round_trip_any_frame((meta, payload) in any_frame()) {
                let encoded = encode(&meta, &payload).unwrap();
                let (decoded_meta, decoded_payload) = decode(&encoded).unwrap();

                prop_assert_eq!(decoded_meta, meta);
                prop_assert_eq!(&decoded_payload[..], &payload[..]);
            }

            #[test]
            fn test_every_truncation_rejected((meta, payload) in any_frame()) {
                let encoded = encode(&meta, &payload).unwrap();
                let header_len = declared_metadata_len(&encoded).unwrap();
                let payload_start = LENGTH_PREFIX_SIZE + header_len;

                for cut in 0..encoded.len() {
                    let result = decode(&encoded.slice(..cut));
                    if cut < LENGTH_PREFIX_SIZE {
                        prop_assert!(matches!(
                            result,
                            Err(CodecError::FrameTooShort { len }) if len == cut
                        ), "cut {}: {:?}", cut, result);
                    } else if cut < payload_start {
                        prop_assert!(matches!(
                            result,
                            Err(CodecError::MetadataLengthMismatch { declared, available })
                                if declared == header_len && available == cut - LENGTH_PREFIX_SIZE
                        ), "cut {}: {:?}", cut, result);
                    } else {
                        prop_assert!(matches!(
                            result,
                            Err(CodecError::PayloadSizeMismatch { expected, actual })
                                if expected == payload.len() && actual == cut - payload_start
                        ), "cut {}: {:?}", cut, result);
                    }
                }
            }

            #[test]
            fn test_extension_rejected(
                (meta, payload) in any_frame(),
                extra in prop::collection::vec(any::<u8>(), 1..64)
            ) {
                let encoded = encode(&meta, &payload).unwrap();
                let mut extended = BytesMut::from(&encoded[..]);
                extended.extend_from_slice(&extra);

                let result = decode(&extended.freeze());
                prop_assert!(matches!(
                    result,
                    Err(CodecError::PayloadSizeMismatch { expected, actual })
                        if expected == payload.len() && actual == payload.len() + extra.len()
                ), "{:?}", result);
            }
        }
    }
}
