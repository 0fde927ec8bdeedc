//! Vote aggregation and output parsing cost per classification

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model_ensemble::{parse_model_output, ModelVote};
use review_contract::{aggregate, aggregate_with, TieBreak};
use review_oracle::{Label, LabelSet};

fn votes(labels: &[&str]) -> Vec<ModelVote> {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| ModelVote {
            model: format!("model-{}", i),
            label: Label::new(*l),
            rationale: "short explanation".to_string(),
        })
        .collect()
}

fn bench_vote(c: &mut Criterion) {
    let majority = votes(&["Valid", "Valid", "Advertisement"]);
    let tie = votes(&["Rant Without Visit", "Advertisement", "unknown", "Valid"]);
    let labels = LabelSet::review_default();

    c.bench_function("aggregate_majority", |b| {
        b.iter(|| black_box(aggregate(black_box(&majority))))
    });

    c.bench_function("aggregate_label_priority_tie", |b| {
        b.iter(|| {
            black_box(aggregate_with(
                black_box(&tie),
                TieBreak::LabelPriority,
                &labels,
            ))
        })
    });

    let raw = "<think>The reviewer talks about the food and service.</think>\n\
        Here is my answer: {\"label\": \"Valid\", \"rationale\": \"Describes a real visit.\"}";
    c.bench_function("parse_model_output", |b| {
        b.iter(|| black_box(parse_model_output(black_box(raw))))
    });
}

criterion_group!(benches, bench_vote);
criterion_main!(benches);
