use crate::error::StreamError;
use crate::stream::StreamId;

/// Builds the combined-stream URL the exchange multiplexes klines over,
/// e.g. `wss://host/stream?streams=btcusdt@kline_1m/ethusdt@kline_5m`.
pub fn combined_stream_url(base_url: &str, streams: &[StreamId]) -> String {
    let names: Vec<String> = streams.iter().map(StreamId::stream_name).collect();
    format!("{}/stream?streams={}", base_url, names.join("/"))
}

/// Greedily packs streams into connection-sized groups.
///
/// Each group respects both hard bounds: at most `max_per_connection`
/// streams, and a serialized URL no longer than `max_url_length` bytes.
/// Streams go into the current group until one of the bounds would be
/// exceeded, at which point a new group starts. A single stream whose URL
/// alone breaks the length bound can never be carried and is rejected.
pub fn pack_streams(
    base_url: &str,
    streams: &[StreamId],
    max_per_connection: usize,
    max_url_length: usize,
) -> Result<Vec<Vec<StreamId>>, StreamError> {
    let mut groups: Vec<Vec<StreamId>> = Vec::new();
    let mut current: Vec<StreamId> = Vec::new();

    for stream in streams {
        let alone = combined_stream_url(base_url, std::slice::from_ref(stream)).len();
        if alone > max_url_length {
            return Err(StreamError::UrlTooLong {
                length: alone,
                max: max_url_length,
            });
        }

        let mut candidate = current.clone();
        candidate.push(stream.clone());
        let fits = candidate.len() <= max_per_connection
            && combined_stream_url(base_url, &candidate).len() <= max_url_length;

        if fits {
            current = candidate;
        } else {
            groups.push(std::mem::replace(&mut current, vec![stream.clone()]));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Interval, Pair};
    use proptest::prelude::*;

    const BASE: &str = "wss://stream.example.com:9443";

    fn stream(base: &str) -> StreamId {
        StreamId::new(Pair::new(base, "USDT"), Interval::OneMinute)
    }

    #[test]
    fn url_joins_stream_names_with_slashes() {
        let streams = [stream("BTC"), stream("ETH")];
        assert_eq!(
            combined_stream_url(BASE, &streams),
            "wss://stream.example.com:9443/stream?streams=btcusdt@kline_1m/ethusdt@kline_1m"
        );
    }

    #[test]
    fn packing_respects_the_connection_count_bound() {
        let streams: Vec<StreamId> =
            ["BTC", "ETH", "SOL", "ADA", "DOT"].iter().map(|b| stream(b)).collect();

        let groups = pack_streams(BASE, &streams, 2, 10_000).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 2);
        assert_eq!(groups[2].len(), 1);
    }

    #[test]
    fn packing_respects_the_url_length_bound() {
        let streams: Vec<StreamId> = ["BTC", "ETH", "SOL"].iter().map(|b| stream(b)).collect();
        let two_fit = combined_stream_url(BASE, &streams[..2]).len();

        let groups = pack_streams(BASE, &streams, 16, two_fit).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[test]
    fn a_stream_too_long_on_its_own_is_rejected() {
        let streams = [stream("BTC")];
        let result = pack_streams(BASE, &streams, 16, 20);
        assert!(matches!(result, Err(StreamError::UrlTooLong { .. })));
    }

    proptest! {
        #[test]
        fn every_group_honors_both_bounds_and_no_stream_is_lost(
            bases in proptest::collection::vec("[a-z]{2,6}", 1..40),
            max_per in 1usize..8,
        ) {
            let streams: Vec<StreamId> = bases
                .iter()
                .map(|b| StreamId::new(Pair::new(b, "USDT"), Interval::OneMinute))
                .collect();

            let max_url = 200;
            match pack_streams(BASE, &streams, max_per, max_url) {
                Ok(groups) => {
                    let total: usize = groups.iter().map(Vec::len).sum();
                    prop_assert_eq!(total, streams.len());
                    for group in &groups {
                        prop_assert!(group.len() <= max_per);
                        prop_assert!(combined_stream_url(BASE, group).len() <= max_url);
                    }
                }
                Err(StreamError::UrlTooLong { length, max }) => {
                    // Only legitimate when some single stream cannot fit.
                    prop_assert!(length > max);
                    let oversized = streams.iter().any(|s| {
                        combined_stream_url(BASE, std::slice::from_ref(s)).len() > max_url
                    });
                    prop_assert!(oversized);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
