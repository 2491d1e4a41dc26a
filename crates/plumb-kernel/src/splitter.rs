//! Command splitting: one token sequence in, one command group per stage
//! out.
//!
//! The split happens once, up front, into immutable groups. Nothing
//! downstream ever mutates the token sequence, so stage indices stay valid
//! for the whole run.

use crate::error::{PipelineError, PipelineResult};

/// Number of delimiter occurrences, which is also the number of channels an
/// N-stage pipeline needs (stages = delimiters + 1).
pub fn count_delimiters(tokens: &[String], delimiter: &str) -> usize {
    tokens.iter().filter(|token| *token == delimiter).count()
}

/// Partition `tokens` into per-stage command groups.
///
/// Zero delimiters yields a single group: the caller's fast-path signal to
/// skip channel creation entirely. A leading or trailing delimiter, or two
/// adjacent ones, produces an empty group and is rejected rather than
/// executed.
pub fn split_stages(tokens: &[String], delimiter: &str) -> PipelineResult<Vec<Vec<String>>> {
    if tokens.is_empty() {
        return Err(PipelineError::EmptyPipeline);
    }

    let mut stages = Vec::with_capacity(count_delimiters(tokens, delimiter) + 1);
    for group in tokens.split(|token| token == delimiter) {
        if group.is_empty() {
            return Err(PipelineError::EmptyStage {
                stage: stages.len(),
            });
        }
        stages.push(group.to_vec());
    }
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[rstest]
    #[case(&["ls", "-l"], 0)]
    #[case(&["ls", "|", "wc"], 1)]
    #[case(&["a", "|", "b", "|", "c"], 2)]
    #[case(&["|"], 1)]
    fn counts_delimiters(#[case] tokens: &[&str], #[case] expected: usize) {
        assert_eq!(count_delimiters(&toks(tokens), "|"), expected);
    }

    #[test]
    fn zero_delimiters_is_a_single_stage() {
        let stages = split_stages(&toks(&["ls", "-l", "/tmp"]), "|").unwrap();
        assert_eq!(stages, vec![toks(&["ls", "-l", "/tmp"])]);
    }

    #[test]
    fn splits_three_stages_in_order() {
        let stages =
            split_stages(&toks(&["seq", "1", "20", "|", "grep", "1", "|", "wc", "-l"]), "|")
                .unwrap();
        assert_eq!(
            stages,
            vec![
                toks(&["seq", "1", "20"]),
                toks(&["grep", "1"]),
                toks(&["wc", "-l"]),
            ]
        );
    }

    #[rstest]
    #[case(&["ls", "|"], 1)]
    #[case(&["|", "ls"], 0)]
    #[case(&["ls", "|", "|", "wc"], 1)]
    fn rejects_empty_stage(#[case] tokens: &[&str], #[case] at: usize) {
        let err = split_stages(&toks(tokens), "|").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyStage { stage } if stage == at));
    }

    #[test]
    fn rejects_empty_input() {
        let err = split_stages(&[], "|").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyPipeline));
    }
}
