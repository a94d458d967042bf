use std::collections::HashMap;
use std::path::Path;

use pvcluster::cluster::report::{read_report, SharedResultWriter};
use pvcluster::cluster::source::{FileEdgeSource, VecEdgeSource};
use pvcluster::{ClusteringConfig, ClusteringJob, ClusteringRunner, PvalueSorter, SortConfig, SparsePoisonedClustering};
use pvcore::file_list::SpectrumFileList;
use pvcore::io::triplet_file::{read_triplets, write_triplets};
use pvcore::{ScanId, Triplet, TripletFormat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn files() -> SpectrumFileList {
    let mut list = SpectrumFileList::new();
    for name in ["run_a.mgf", "run_b.mgf", "run_c.mgf"] {
        list.add_file(name);
    }
    list
}

fn random_edges(rng: &mut StdRng, n: usize, scans: u32) -> Vec<Triplet> {
    (0..n)
        .map(|_| {
            let a = ScanId::new(rng.gen_range(0..3), rng.gen_range(0..scans));
            let b = ScanId::new(rng.gen_range(0..3), rng.gen_range(0..scans));
            Triplet::new(a, b, rng.gen::<f32>())
        })
        .filter(|t| !t.is_self_loop())
        .collect()
}

fn sort_into(inputs: &[&Path], result: &Path, budget: usize) -> Vec<Triplet> {
    let sorter = PvalueSorter::new(SortConfig { num_threads: 3, ..SortConfig::with_budget(budget) }).unwrap();
    sorter.filter_and_sort(inputs, result).unwrap();
    read_triplets(result, TripletFormat::Binary).unwrap()
}

/// Connected components over edges below the cutoff, keyed by smallest member.
fn components(edges: &[Triplet], cutoff: f64) -> HashMap<ScanId, Vec<ScanId>> {
    let mut parent: HashMap<ScanId, ScanId> = HashMap::new();
    fn find(parent: &mut HashMap<ScanId, ScanId>, x: ScanId) -> ScanId {
        let p = *parent.entry(x).or_insert(x);
        if p == x {
            return x;
        }
        let r = find(parent, p);
        parent.insert(x, r);
        r
    }
    for t in edges.iter().filter(|t| (t.pval as f64) < cutoff) {
        let (a, b) = (find(&mut parent, t.scannr1), find(&mut parent, t.scannr2));
        if a != b {
            parent.insert(a.max(b), a.min(b));
        }
    }
    let nodes: Vec<ScanId> = parent.keys().copied().collect();
    let mut out: HashMap<ScanId, Vec<ScanId>> = HashMap::new();
    for n in nodes {
        let r = find(&mut parent, n);
        out.entry(r).or_default().push(n);
    }
    out.retain(|_, members| members.len() > 1);
    for members in out.values_mut() {
        members.sort();
    }
    out
}

#[test]
fn test_dedup_and_sort_keeps_lowest_value_per_pair() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, c, d) = (ScanId::new(0, 1), ScanId::new(0, 2), ScanId::new(1, 1), ScanId::new(1, 2));
    let input = dir.path().join("pvals.bin");
    write_triplets(
        &input,
        &[Triplet::new(a, b, 0.2), Triplet::new(b, a, 0.05), Triplet::new(c, d, 0.9)],
        false,
        TripletFormat::Binary,
    )
    .unwrap();

    let sorted = sort_into(&[input.as_path()], &dir.path().join("sorted.bin"), 2);
    assert_eq!(sorted, vec![Triplet::new(a, b, 0.05), Triplet::new(c, d, 0.9)]);
    assert_eq!(sorted[0].scannr1, a);
}

#[test]
fn test_cutoff_stops_before_expensive_edges() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, c, d) = (ScanId::new(0, 1), ScanId::new(0, 2), ScanId::new(1, 1), ScanId::new(1, 2));
    let path = dir.path().join("sorted.bin");
    write_triplets(&path, &[Triplet::new(a, b, 0.05), Triplet::new(c, d, 0.9)], false, TripletFormat::Binary).unwrap();

    let source = FileEdgeSource::open(&path).unwrap();
    let outcome = SparsePoisonedClustering::new(source, files().merge_offset(), ClusteringConfig::default())
        .do_clustering(0.5)
        .unwrap();
    assert_eq!(outcome.tree, vec![Triplet::new(a, b, 0.05)]);
    assert!(outcome.poisoned.is_empty());
    assert_eq!(outcome.skipped_above_cutoff, 1);
}

#[test]
fn test_edge_into_poisoned_node_is_reported_not_merged() {
    let (a, b, c) = (ScanId::new(0, 1), ScanId::new(0, 2), ScanId::new(0, 3));
    let edges = vec![Triplet::new(a, b, 0.1), Triplet::new(b, c, 0.1)];
    let outcome = SparsePoisonedClustering::new(VecEdgeSource::new(edges), files().merge_offset(), ClusteringConfig::default())
        .with_poisoned([c])
        .do_clustering(1.0)
        .unwrap();

    assert_eq!(outcome.tree, vec![Triplet::new(a, b, 0.1)]);
    assert_eq!(outcome.poisoned, vec![Triplet::new(a, c, 0.1)]);
    assert_eq!(outcome.cluster_members()[&a], vec![a, b]);
}

#[test]
fn test_sorted_output_is_total_and_unique() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let mut all = Vec::new();
    let mut inputs = Vec::new();
    for i in 0..3 {
        let edges = random_edges(&mut rng, 700, 60);
        let path = dir.path().join(format!("part{}.bin", i));
        write_triplets(&path, &edges, false, TripletFormat::Binary).unwrap();
        all.extend(edges);
        inputs.push(path);
    }
    let input_refs: Vec<&Path> = inputs.iter().map(|p| p.as_path()).collect();
    let result = dir.path().join("sorted.bin");
    let sorted = sort_into(&input_refs, &result, 150);

    let mut best: HashMap<(ScanId, ScanId), f32> = HashMap::new();
    for t in &all {
        let e = best.entry(t.canonical_pair()).or_insert(t.pval);
        *e = e.min(t.pval);
    }
    assert_eq!(sorted.len(), best.len());
    assert!(sorted.windows(2).all(|w| w[0] < w[1] && !w[0].same_pair(&w[1])));
    for t in &sorted {
        assert!(t.scannr1 < t.scannr2);
        assert_eq!(best[&t.canonical_pair()], t.pval);
    }

    // sorting the result again changes nothing
    let again = sort_into(&[result.as_path()], &result, 150);
    assert_eq!(again, sorted);
}

#[test]
fn test_clusters_match_connected_components_without_poison() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let edges = random_edges(&mut rng, 400, 150);
    let input = dir.path().join("pvals.bin");
    write_triplets(&input, &edges, false, TripletFormat::Binary).unwrap();
    let result = dir.path().join("sorted.bin");
    let sorted = sort_into(&[input.as_path()], &result, 64);

    let cutoff = 0.3;
    for batch_size in [usize::MAX / 2, 37] {
        let config = ClusteringConfig { batch_size, ..Default::default() };
        let outcome = SparsePoisonedClustering::new(FileEdgeSource::open(&result).unwrap(), 3, config)
            .do_clustering(cutoff)
            .unwrap();

        assert_eq!(outcome.cluster_members(), components(&sorted, cutoff));
        assert!(outcome.tree.iter().all(|t| (t.pval as f64) < cutoff));
        assert!(outcome.tree.windows(2).all(|w| w[0].pval <= w[1].pval));
    }
}

#[test]
fn test_poisoned_scans_never_join_a_cluster() {
    let mut rng = StdRng::seed_from_u64(23);
    let edges = random_edges(&mut rng, 500, 80);
    let seeds: Vec<ScanId> = (0..6).map(|i| ScanId::new(i % 3, i * 7)).collect();

    let outcome = SparsePoisonedClustering::new(VecEdgeSource::new(edges), 3, ClusteringConfig::default())
        .with_poisoned(seeds.iter().copied())
        .do_clustering(0.6)
        .unwrap();

    let members = outcome.cluster_members();
    for seed in &seeds {
        assert!(members.values().all(|m| !m.contains(seed)));
    }
    for t in &outcome.tree {
        assert!(!seeds.contains(&t.scannr1) && !seeds.contains(&t.scannr2));
    }
}

#[test]
fn test_runner_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let mut jobs = Vec::new();
    let mut expected = 0;
    for i in 0..4 {
        let input = dir.path().join(format!("window{}.bin", i));
        write_triplets(&input, &random_edges(&mut rng, 200, 40), false, TripletFormat::Binary).unwrap();
        let sorted = dir.path().join(format!("window{}.sorted.bin", i));
        sort_into(&[input.as_path()], &sorted, 50);

        let reference = SparsePoisonedClustering::new(FileEdgeSource::open(&sorted).unwrap(), 3, ClusteringConfig::default())
            .do_clustering(0.2)
            .unwrap();
        expected += reference.tree.len();
        jobs.push(ClusteringJob::new(format!("window{}", i), FileEdgeSource::open(&sorted).unwrap(), 0.2, 3));
    }

    let tree = SharedResultWriter::create(dir.path().join("tree.tsv")).unwrap();
    let runner = ClusteringRunner::new(4, ClusteringConfig::default()).unwrap();
    let summaries = runner.run(jobs, &tree, None).unwrap();

    assert_eq!(summaries.iter().map(|s| s.merges as usize).sum::<usize>(), expected);
    assert_eq!(read_report(tree.path()).unwrap().len(), expected);
}
