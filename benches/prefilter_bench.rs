//! Pre-filter throughput on typical review lengths

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use review_oracle::{Label, LabelSet, PreFilter, PrefilterRule, RuleMatcher};

const CLEAN: &str = "The margherita was excellent, crust crisp and the staff \
    remembered our order from last week. A bit loud on Friday nights but \
    worth the wait for a table by the window.";
const AD: &str = "Honestly the best slices around, and if you use code SLICE20 \
    you get a discount on your next order!";

fn bench_prefilter(c: &mut Criterion) {
    let prefilter = PreFilter::with_review_defaults();

    c.bench_function("prefilter_no_match", |b| {
        b.iter(|| black_box(prefilter.check(black_box(CLEAN))))
    });

    c.bench_function("prefilter_first_rule_match", |b| {
        b.iter(|| black_box(prefilter.check(black_box(AD))))
    });

    let long_review = CLEAN.repeat(40);
    c.bench_function("prefilter_long_review", |b| {
        b.iter(|| black_box(prefilter.check(black_box(&long_review))))
    });

    let labels = LabelSet::review_default();
    let mut rules = review_oracle::default_rules();
    rules.push(PrefilterRule {
        name: "phone_number".to_string(),
        label: Label::new("Advertisement"),
        matcher: RuleMatcher::Pattern {
            regex: r"\b\d{3}[- ]\d{3}[- ]\d{4}\b".to_string(),
        },
    });
    let with_regex = match PreFilter::new(&rules, &labels) {
        Ok(p) => p,
        Err(e) => panic!("bench rules invalid: {}", e),
    };
    c.bench_function("prefilter_with_regex_rule", |b| {
        b.iter(|| black_box(with_regex.check(black_box(CLEAN))))
    });
}

criterion_group!(benches, bench_prefilter);
criterion_main!(benches);
