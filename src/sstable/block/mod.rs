pub mod builder;
pub mod reader;

pub use builder::BlockBuilder;
pub use reader::Block;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BlockEncoding;

    fn build(encoding: BlockEncoding, entries: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut b = BlockBuilder::new(4096, encoding);
        for (k, v) in entries {
            assert!(b.add(k, v));
        }
        b.build()
    }

    const ENTRIES: &[(&[u8], &[u8])] = &[
        (b"user_0001", b"alice"),
        (b"user_0002", b"bob"),
        (b"user_0010", b""),
        (b"zebra", b"stripes"),
    ];

    #[test]
    fn decode_both_encodings() {
        for enc in [BlockEncoding::None, BlockEncoding::Prefix] {
            let block = Block::decode(build(enc, ENTRIES)).unwrap();
            assert_eq!(block.encoding(), enc);
            assert_eq!(block.len(), ENTRIES.len());
            for (k, v) in ENTRIES {
                assert_eq!(block.get(k), Some(*v), "{enc:?}");
            }
            assert_eq!(block.get(b"user_0003"), None);
        }
    }

    #[test]
    fn prefix_encoding_is_smaller_for_shared_keys() {
        let plain = build(BlockEncoding::None, ENTRIES);
        let prefixed = build(BlockEncoding::Prefix, ENTRIES);
        assert!(prefixed.len() < plain.len());
    }

    #[test]
    fn truncated_block_is_corruption() {
        let data = build(BlockEncoding::None, ENTRIES);
        assert!(Block::decode(data[..3].to_vec()).is_err());

        let mut bad = data.clone();
        let n = bad.len();
        bad[n - 1] = 9; // unknown encoding id
        assert!(Block::decode(bad).is_err());
    }

    #[test]
    fn full_block_rejects_entry() {
        let mut b = BlockBuilder::new(32, BlockEncoding::None);
        assert!(b.add(b"a", b"b"));
        assert!(!b.add(b"c", &[0u8; 30]));
        assert_eq!(b.len(), 1);
        assert_eq!(b.last_key(), b"a");
    }
}
