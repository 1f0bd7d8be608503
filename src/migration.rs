//! Re-encoding stored lists when the element codec changes.
//!
//! Migration works element by element: decode one element with the prior
//! codec, convert it, encode it with the new codec, write a delimiter if more
//! input follows. The list is never materialized as a whole.

use crate::codec::{decode_next, ByteCursor, ElementCodec, TtlValue, DELIMITER};
use crate::error::{Result, StateError};
use crate::ttl::TimeProvider;
use std::sync::Arc;
use tracing::debug;

/// Converts one element from a prior schema to a new one.
pub trait ElementMigration<P, N>: Send + Sync {
    fn migrate(&self, prior: P) -> Result<N>;
}

impl<P, N, F> ElementMigration<P, N> for F
where
    F: Fn(P) -> Result<N> + Send + Sync,
{
    fn migrate(&self, prior: P) -> Result<N> {
        self(prior)
    }
}

/// Keeps the element as is; for codec changes that do not change the type.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unchanged;

impl<T> ElementMigration<T, T> for Unchanged {
    fn migrate(&self, prior: T) -> Result<T> {
        Ok(prior)
    }
}

/// Wraps plain elements with the current time when TTL is switched on.
pub struct EnableTtl {
    time: Arc<dyn TimeProvider>,
}

impl EnableTtl {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self { time }
    }
}

impl<T> ElementMigration<T, TtlValue<T>> for EnableTtl {
    fn migrate(&self, prior: T) -> Result<TtlValue<T>> {
        Ok(TtlValue::new(prior, self.time.now_millis()))
    }
}

/// Unwraps elements when TTL is switched off.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisableTtl;

impl<T> ElementMigration<TtlValue<T>, T> for DisableTtl {
    fn migrate(&self, prior: TtlValue<T>) -> Result<T> {
        Ok(prior.value)
    }
}

/// Migrate one encoded list from `prior` to `new`, appending to `out`.
///
/// Returns the number of elements migrated. On failure `out` is restored to
/// its original length and a [`StateError::StateMigration`] is returned.
pub fn migrate_list<P, N, M>(
    input: &[u8],
    prior: &P,
    new: &N,
    migration: &M,
    out: &mut Vec<u8>,
) -> Result<usize>
where
    P: ElementCodec,
    N: ElementCodec,
    M: ElementMigration<P::Item, N::Item> + ?Sized,
{
    let start_len = out.len();
    let result = migrate_into(input, prior, new, migration, out);
    if result.is_err() {
        out.truncate(start_len);
    }
    result
}

fn migrate_into<P, N, M>(
    input: &[u8],
    prior: &P,
    new: &N,
    migration: &M,
    out: &mut Vec<u8>,
) -> Result<usize>
where
    P: ElementCodec,
    N: ElementCodec,
    M: ElementMigration<P::Item, N::Item> + ?Sized,
{
    let mut cursor = ByteCursor::new(input);
    let mut count = 0;

    while !cursor.is_empty() {
        let offset = cursor.position();
        let element = match decode_next(prior, &mut cursor) {
            Ok(Some(element)) => element,
            Ok(None) => break,
            Err(e) => {
                return Err(StateError::migration(
                    format!(
                        "decoding element {} at offset {} with {}",
                        count,
                        offset,
                        prior.descriptor()
                    ),
                    e,
                ))
            }
        };

        let migrated = migration.migrate(element).map_err(|e| {
            StateError::migration(
                format!(
                    "migrating element {} from {} to {}",
                    count,
                    prior.descriptor(),
                    new.descriptor()
                ),
                e,
            )
        })?;

        new.encode(&migrated, out).map_err(|e| {
            StateError::migration(
                format!("encoding element {} with {}", count, new.descriptor()),
                e,
            )
        })?;
        count += 1;

        if !cursor.is_empty() {
            out.push(DELIMITER);
        }
    }

    debug!(
        elements = count,
        from = %prior.descriptor(),
        to = %new.descriptor(),
        "migrated list"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_list, encode_list, MsgPackCodec, StringCodec, TtlCodec, U64Codec};
    use crate::ttl::ManualTimeProvider;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct ReadingV1 {
        sensor: String,
        celsius: i32,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct ReadingV2 {
        sensor: String,
        millicelsius: i64,
        calibrated: bool,
    }

    fn v1_codec() -> MsgPackCodec<ReadingV1> {
        MsgPackCodec::with_version("reading", 1)
    }

    fn v2_codec() -> MsgPackCodec<ReadingV2> {
        MsgPackCodec::with_version("reading", 2)
    }

    fn upgrade(r: ReadingV1) -> Result<ReadingV2> {
        Ok(ReadingV2 {
            sensor: r.sensor,
            millicelsius: i64::from(r.celsius) * 1000,
            calibrated: false,
        })
    }

    fn readings() -> Vec<ReadingV1> {
        vec![
            ReadingV1 { sensor: "a".into(), celsius: 20 },
            ReadingV1 { sensor: "b,c".into(), celsius: -3 },
            ReadingV1 { sensor: "d".into(), celsius: 44 },
        ]
    }

    #[test]
    fn test_migrate_three_elements() {
        let input = encode_list(&v1_codec(), &readings()).unwrap();
        let mut out = Vec::new();

        let n = migrate_list(&input, &v1_codec(), &v2_codec(), &upgrade, &mut out).unwrap();
        assert_eq!(n, 3);

        let migrated = decode_list(&v2_codec(), Some(out.as_slice())).unwrap();
        let expected: Vec<ReadingV2> = readings().into_iter().map(|r| upgrade(r).unwrap()).collect();
        assert_eq!(migrated, expected);
    }

    #[test]
    fn test_output_matches_fresh_encoding() {
        let input = encode_list(&U64Codec, &[1, 2, 3]).unwrap();
        let mut out = Vec::new();
        migrate_list(&input, &U64Codec, &U64Codec, &Unchanged, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_truncated_second_element() {
        let mut input = encode_list(&v1_codec(), &readings()[..1]).unwrap();
        input.push(DELIMITER);
        input.extend_from_slice(&[0x92, 0xa3, b'x']);

        let mut out = b"prefix".to_vec();
        let err = migrate_list(&input, &v1_codec(), &v2_codec(), &upgrade, &mut out).unwrap_err();
        assert!(matches!(err, StateError::StateMigration { .. }));
        assert_eq!(out, b"prefix");
    }

    #[test]
    fn test_failing_element_migration() {
        let input = encode_list(&StringCodec, &["ok".to_string(), "bad".to_string()]).unwrap();
        let strict = |s: String| -> Result<String> {
            if s == "bad" {
                Err(StateError::InvalidArgument("rejected".into()))
            } else {
                Ok(s)
            }
        };

        let mut out = Vec::new();
        let err = migrate_list(&input, &StringCodec, &StringCodec, &strict, &mut out).unwrap_err();
        match err {
            StateError::StateMigration { source: Some(source), .. } => {
                assert!(matches!(*source, StateError::InvalidArgument(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_enable_and_disable_ttl() {
        let clock = Arc::new(ManualTimeProvider::new(5_000));
        let plain = encode_list(&StringCodec, &["x".to_string(), "y".to_string()]).unwrap();
        let ttl_codec = TtlCodec::new(StringCodec);

        let mut with_ttl = Vec::new();
        migrate_list(&plain, &StringCodec, &ttl_codec, &EnableTtl::new(clock), &mut with_ttl)
            .unwrap();
        let decoded = decode_list(&ttl_codec, Some(with_ttl.as_slice())).unwrap();
        assert_eq!(decoded[1], TtlValue::new("y".to_string(), 5_000));

        let mut back = Vec::new();
        migrate_list(&with_ttl, &ttl_codec, &StringCodec, &DisableTtl, &mut back).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn test_empty_input() {
        let mut out = Vec::new();
        let n = migrate_list(&[], &U64Codec, &U64Codec, &Unchanged, &mut out).unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }
}
