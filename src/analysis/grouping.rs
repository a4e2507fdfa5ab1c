use crate::db::models::Segment;

/// Partition start-ordered pending segments into batches. A segment joins the
/// open group while it starts less than `batch_duration_secs` after the
/// group's first segment; otherwise it opens the next group.
pub fn group_segments(segments: Vec<Segment>, batch_duration_secs: i64) -> Vec<Vec<Segment>> {
    let mut groups: Vec<Vec<Segment>> = Vec::new();
    let mut current: Vec<Segment> = Vec::new();

    for segment in segments {
        let fits = current
            .first()
            .map(|first| segment.start_ts - first.start_ts < batch_duration_secs)
            .unwrap_or(true);

        if !fits {
            groups.push(std::mem::take(&mut current));
        }
        current.push(segment);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ProcessingStatus;

    fn segments(starts: &[i64]) -> Vec<Segment> {
        starts
            .iter()
            .enumerate()
            .map(|(i, &start_ts)| Segment {
                id: i as i64 + 1,
                start_ts,
                end_ts: start_ts + 15,
                file_path: format!("/r/chunk_{start_ts}.mp4"),
                status: ProcessingStatus::Pending,
            })
            .collect()
    }

    fn starts(groups: &[Vec<Segment>]) -> Vec<Vec<i64>> {
        groups
            .iter()
            .map(|group| group.iter().map(|s| s.start_ts).collect())
            .collect()
    }

    #[test]
    fn splits_at_threshold() {
        let groups = group_segments(segments(&[0, 500, 1200]), 900);
        assert_eq!(starts(&groups), vec![vec![0, 500], vec![1200]]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let groups = group_segments(segments(&[0, 899, 900]), 900);
        assert_eq!(starts(&groups), vec![vec![0, 899], vec![900]]);
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(group_segments(Vec::new(), 900).is_empty());
        let groups = group_segments(segments(&[42]), 900);
        assert_eq!(starts(&groups), vec![vec![42]]);
    }

    #[test]
    fn grouping_is_an_ordered_partition() {
        let input: Vec<i64> = (0..60).map(|i| i * 37 + (i % 7) * 11).collect();
        for threshold in [1, 15, 100, 900, 10_000] {
            let groups = group_segments(segments(&input), threshold);
            assert!(groups.iter().all(|g| !g.is_empty()));

            let flattened: Vec<i64> = starts(&groups).into_iter().flatten().collect();
            assert_eq!(flattened, input);

            for (index, group) in groups.iter().enumerate() {
                let first = group[0].start_ts;
                assert!(group.iter().all(|s| s.start_ts - first < threshold));
                if let Some(next) = groups.get(index + 1) {
                    assert!(next[0].start_ts - first >= threshold);
                }
            }
        }
    }
}
