use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use maimai_tracker::cache::CacheKey;
use maimai_tracker::filter::{
    filter_scores, reduce, sort_scores, FilterAction, FilterSeed, FilterState, FilterUpdate,
    ScoreSort,
};
use maimai_tracker::models::{FcType, LevelIndex, RateType, Score, SongType};

fn sample_scores(count: u32) -> Vec<Score> {
    (0..count)
        .map(|idx| {
            let base = 1 + idx % 15;
            let plus = idx % 3 == 0;
            Score {
                id: idx,
                song_name: format!("song {idx}"),
                level: if plus { format!("{base}+") } else { base.to_string() },
                level_index: LevelIndex::ALL[(idx % 5) as usize],
                achievements: 70.0 + f64::from(idx % 310) / 10.0,
                fc: match idx % 4 {
                    0 => None,
                    1 => Some(FcType::Fc),
                    2 => Some(FcType::Fcp),
                    _ => Some(FcType::Ap),
                },
                fs: None,
                dx_score: idx % 3000,
                dx_rating: f64::from(idx % 340),
                rate: if idx % 2 == 0 { RateType::S } else { RateType::Sssp },
                song_type: if idx % 7 == 0 { SongType::Standard } else { SongType::Dx },
                genre: Some(if idx % 2 == 0 { "maimai" } else { "POPS＆アニメ" }.to_string()),
                version: Some(10000 + (idx % 15) * 1000),
                upload_time: None,
            }
        })
        .collect()
}

fn bench_filter_scores(c: &mut Criterion) {
    let scores = sample_scores(5_000);
    let mut state = FilterState::default();
    state.cleared_only = true;
    state.level_range = [12.0, 15.0];
    state.fc = vec![FcType::Fcp, FcType::Ap];

    c.bench_function("filter_scores_5000", |b| {
        b.iter(|| {
            let hits = filter_scores(black_box(&state), black_box(&scores));
            black_box(hits.len());
        })
    });

    c.bench_function("filter_and_sort_by_rating_5000", |b| {
        b.iter(|| {
            let mut hits = filter_scores(black_box(&state), black_box(&scores));
            sort_scores(&mut hits, ScoreSort::DxRating);
            black_box(hits.first().map(|score| score.id));
        })
    });
}

fn bench_reduce(c: &mut Criterion) {
    let state = FilterState::default();
    let seed = FilterSeed {
        difficulties: Some(vec![LevelIndex::Master, LevelIndex::ReMaster]),
        cleared_only: Some(true),
        ..FilterSeed::default()
    };

    c.bench_function("reduce_set_and_reset", |b| {
        b.iter(|| {
            let next = reduce(
                black_box(&state),
                FilterAction::Set(FilterUpdate::LevelRange([13.0, 14.9])),
            );
            let reset = reduce(&next, FilterAction::Reset(seed.clone()));
            black_box(reset == state);
        })
    });
}

fn bench_cache_key(c: &mut Criterion) {
    c.bench_function("cache_key_with_query", |b| {
        b.iter(|| {
            let key = CacheKey::with_query(
                black_box("maimai/alias/list"),
                [("sort", "weight.total"), ("page", "3"), ("approved", "true")],
            );
            black_box(key);
        })
    });
}

criterion_group!(benches, bench_filter_scores, bench_reduce, bench_cache_key);
criterion_main!(benches);
