// 📊 Review Aggregation - outcome stats for one practitioner
//
// Single pass over the reviews. Only approved reviews count toward the
// averages and distributions; `total_reviews` is everything supplied.

use crate::entities::review::{
    ConditionTreated, OutcomeRating, Review, ReviewStatus, ReviewTreatment,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub subject_id: String,
    pub total_reviews: usize,
    pub approved_reviews: usize,

    /// Approved reviews submitted with a review token
    pub verified_reviews: usize,

    /// Mean star rating, 2 decimal places
    pub average_rating: Option<f64>,

    pub outcome_counts: BTreeMap<OutcomeRating, usize>,
    pub condition_counts: BTreeMap<ConditionTreated, usize>,
    pub treatment_counts: BTreeMap<ReviewTreatment, usize>,

    /// Percent of approved reviewers who would recommend, rounded
    pub recommendation_rate: Option<u32>,

    /// Percent of approved reviews with a positive outcome, rounded
    pub positive_outcome_rate: Option<u32>,

    pub updated_at: DateTime<Utc>,
}

impl ReviewStats {
    pub fn empty(subject_id: &str, now: DateTime<Utc>) -> Self {
        ReviewStats {
            subject_id: subject_id.to_string(),
            total_reviews: 0,
            approved_reviews: 0,
            verified_reviews: 0,
            average_rating: None,
            outcome_counts: BTreeMap::new(),
            condition_counts: BTreeMap::new(),
            treatment_counts: BTreeMap::new(),
            recommendation_rate: None,
            positive_outcome_rate: None,
            updated_at: now,
        }
    }

    pub fn has_reviews(&self) -> bool {
        self.approved_reviews > 0
    }
}

/// Aggregate the reviews of one subject
pub fn aggregate_reviews(subject_id: &str, reviews: &[Review], now: DateTime<Utc>) -> ReviewStats {
    let mut stats = ReviewStats::empty(subject_id, now);
    let mut rating_sum: u64 = 0;
    let mut recommend_count: usize = 0;

    for review in reviews {
        stats.total_reviews += 1;

        if review.status != ReviewStatus::Approved {
            continue;
        }

        stats.approved_reviews += 1;
        rating_sum += u64::from(review.rating);
        if review.would_recommend {
            recommend_count += 1;
        }
        if review.is_verified {
            stats.verified_reviews += 1;
        }

        *stats.outcome_counts.entry(review.outcome_rating).or_insert(0) += 1;
        *stats.condition_counts.entry(review.condition_treated).or_insert(0) += 1;
        *stats.treatment_counts.entry(review.treatment_type).or_insert(0) += 1;
    }

    if stats.approved_reviews > 0 {
        let n = stats.approved_reviews as f64;
        stats.average_rating = Some((rating_sum as f64 / n * 100.0).round() / 100.0);
        stats.recommendation_rate = Some(percent(recommend_count, stats.approved_reviews));
        stats.positive_outcome_rate = Some(positive_outcome_rate(&stats.outcome_counts));
    }

    stats
}

/// Share of positive outcomes as a rounded percentage, 0 when empty
pub fn positive_outcome_rate(outcome_counts: &BTreeMap<OutcomeRating, usize>) -> u32 {
    let total: usize = outcome_counts.values().sum();
    let positive: usize = OutcomeRating::POSITIVE
        .iter()
        .map(|o| outcome_counts.get(o).copied().unwrap_or(0))
        .sum();

    percent(positive, total)
}

// ============================================================================
// DISTRIBUTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionEntry<K> {
    pub key: K,
    pub count: usize,
    pub percentage: u32,
}

/// Non-zero buckets, largest first (ties broken by key order)
pub fn distribution<K: Ord + Copy>(counts: &BTreeMap<K, usize>) -> Vec<DistributionEntry<K>> {
    let total: usize = counts.values().sum();

    let mut entries: Vec<DistributionEntry<K>> = counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(key, count)| DistributionEntry {
            key: *key,
            count: *count,
            percentage: percent(*count, total),
        })
        .collect();

    // Stable sort keeps BTreeMap key order for ties
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(
        rating: u8,
        outcome: OutcomeRating,
        condition: ConditionTreated,
        treatment: ReviewTreatment,
        recommend: bool,
        status: ReviewStatus,
    ) -> Review {
        let now = Utc::now();
        Review {
            id: uuid::Uuid::new_v4().to_string(),
            practitioner_id: "p1".to_string(),
            rating,
            outcome_rating: outcome,
            treatment_type: treatment,
            condition_treated: condition,
            review_text: None,
            would_recommend: recommend,
            treatment_month: None,
            treatment_year: None,
            token_id: None,
            is_verified: false,
            status,
            moderated_at: None,
            moderated_by: None,
            moderation_notes: None,
            practitioner_response: None,
            response_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample() -> Vec<Review> {
        use ConditionTreated::*;
        use OutcomeRating::*;
        use ReviewStatus::*;
        use ReviewTreatment::*;

        let mut verified = review(5, LifeChanging, Depression, Psilocybin, true, Approved);
        verified.is_verified = true;

        vec![
            verified,
            review(5, SignificantImprovement, Ptsd, Mdma, true, Approved),
            review(4, SlightImprovement, Depression, Ketamine, false, Approved),
            review(1, GotWorse, Anxiety, Ketamine, false, Pending),
            review(2, NoChange, Anxiety, Ketamine, false, Rejected),
        ]
    }

    #[test]
    fn test_aggregate_counts_only_approved() {
        let stats = aggregate_reviews("p1", &sample(), Utc::now());

        assert_eq!(stats.subject_id, "p1");
        assert_eq!(stats.total_reviews, 5);
        assert_eq!(stats.approved_reviews, 3);
        assert_eq!(stats.verified_reviews, 1);
        assert_eq!(stats.average_rating, Some(4.67));
        assert_eq!(stats.recommendation_rate, Some(67));
        assert_eq!(stats.positive_outcome_rate, Some(67));
        assert!(stats.has_reviews());

        assert_eq!(stats.condition_counts.get(&ConditionTreated::Depression), Some(&2));
        assert_eq!(stats.condition_counts.get(&ConditionTreated::Anxiety), None);
        assert_eq!(stats.treatment_counts.get(&ReviewTreatment::Ketamine), Some(&1));
        assert_eq!(stats.outcome_counts.values().sum::<usize>(), 3);
    }

    #[test]
    fn test_aggregate_empty() {
        let stats = aggregate_reviews("p1", &[], Utc::now());

        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.average_rating, None);
        assert_eq!(stats.recommendation_rate, None);
        assert_eq!(stats.positive_outcome_rate, None);
        assert!(stats.outcome_counts.is_empty());
        assert!(!stats.has_reviews());
    }

    #[test]
    fn test_only_pending_reviews_yield_no_averages() {
        let pending = vec![review(
            5,
            OutcomeRating::LifeChanging,
            ConditionTreated::Ocd,
            ReviewTreatment::Lsd,
            true,
            ReviewStatus::Pending,
        )];
        let stats = aggregate_reviews("p1", &pending, Utc::now());

        assert_eq!(stats.total_reviews, 1);
        assert_eq!(stats.approved_reviews, 0);
        assert_eq!(stats.average_rating, None);
    }

    #[test]
    fn test_positive_outcome_rate() {
        let mut counts = BTreeMap::new();
        assert_eq!(positive_outcome_rate(&counts), 0);

        counts.insert(OutcomeRating::ModerateImprovement, 1);
        counts.insert(OutcomeRating::NoChange, 2);
        assert_eq!(positive_outcome_rate(&counts), 33);
    }

    #[test]
    fn test_distribution_sorted_and_non_zero() {
        let mut counts = BTreeMap::new();
        counts.insert(ConditionTreated::Ptsd, 1);
        counts.insert(ConditionTreated::Depression, 3);
        counts.insert(ConditionTreated::Anxiety, 0);
        counts.insert(ConditionTreated::Trauma, 1);

        let dist = distribution(&counts);
        assert_eq!(dist.len(), 3);
        assert_eq!(dist[0].key, ConditionTreated::Depression);
        assert_eq!(dist[0].percentage, 60);
        // ties keep declaration order: Ptsd before Trauma
        assert_eq!(dist[1].key, ConditionTreated::Ptsd);
        assert_eq!(dist[2].key, ConditionTreated::Trauma);
        assert_eq!(dist[2].percentage, 20);
    }

    #[test]
    fn test_stats_json_round_trip_keeps_enum_keys() {
        let stats = aggregate_reviews("p1", &sample(), Utc::now());
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["outcome_counts"]["life_changing"], 1);
        assert_eq!(json["treatment_counts"]["5-meo-dmt"], serde_json::Value::Null);

        let back: ReviewStats = serde_json::from_value(json).unwrap();
        assert_eq!(back.outcome_counts, stats.outcome_counts);
        assert_eq!(back.condition_counts, stats.condition_counts);
        assert_eq!(back.treatment_counts, stats.treatment_counts);
        assert_eq!(back.recommendation_rate, Some(67));
    }
}
