use chordalysis::{
    structure_message_length, Dataset, DecomposableModel, Explorer, Format, LogFactorials,
    SearchConfig, Termination, VariableSet,
};
use proptest::prelude::*;

/// Rows of small categorical values. The last column copies the first, so most datasets have
/// at least one association worth an edge.
fn tables() -> impl Strategy<Value = Vec<Vec<u8>>> {
    (1usize..=4).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(0u8..3, n), 1..80).prop_map(|rows| {
            rows.into_iter()
                .map(|mut row| {
                    row.push(row[0]);
                    row
                })
                .collect::<Vec<_>>()
        })
    })
}

fn dataset(rows: &[Vec<u8>]) -> Dataset {
    let width = rows[0].len();
    let header: Vec<String> = (0..width).map(|i| format!("v{}", i)).collect();
    let mut text = header.join(",");
    text.push('\n');
    for row in rows {
        let fields: Vec<String> = row.iter().map(u8::to_string).collect();
        text.push_str(&fields.join(","));
        text.push('\n');
    }
    Dataset::from_reader(text.as_bytes(), Format::Csv).unwrap()
}

/// Checks that the graph is chordal: numbering vertices by maximum cardinality search, each
/// vertex's earlier-numbered neighbours must all be adjacent to one another.
fn is_chordal(model: &DecomposableModel) -> bool {
    let n = model.n_variables();
    let mut weight = vec![0usize; n];
    let mut numbered = vec![false; n];
    for _ in 0..n {
        let v = (0..n)
            .filter(|v| !numbered[*v])
            .max_by_key(|v| weight[*v])
            .unwrap();
        let earlier: Vec<u32> = model
            .neighbours(v as u32)
            .iter()
            .filter(|u| numbered[*u as usize])
            .collect();
        for (i, x) in earlier.iter().enumerate() {
            for y in earlier[i + 1..].iter() {
                if !model.is_adjacent(*x, *y) {
                    return false;
                }
            }
        }
        numbered[v] = true;
        for u in model.neighbours(v as u32).iter() {
            weight[u as usize] += 1;
        }
    }
    true
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn structure_cost_is_symmetric(n_variables in 1usize..40, fraction in 0f64..=1.0) {
        let max_edges = n_variables * (n_variables - 1) / 2;
        let k = (fraction * max_edges as f64).floor() as usize;
        let lf = LogFactorials::new(max_edges);
        let forward = structure_message_length(&lf, n_variables, k);
        let backward = structure_message_length(&lf, n_variables, max_edges - k);
        prop_assert!((forward - backward).abs() < 1e-9);
        prop_assert!(forward >= ((max_edges + 1) as f64).ln() - 1e-9);
    }

    #[test]
    fn search_only_shortens_the_message(rows in tables()) {
        let data = dataset(&rows);
        let (explorer, exploration) = Explorer::build_model(&data, &SearchConfig::default()).unwrap();

        let n = explorer.n_variables();
        prop_assert!(exploration.steps <= n * (n - 1) / 2);

        let computer = explorer.computer();
        let independence: f64 = (0..n as u32)
            .map(|v| computer.message_length(&VariableSet::new(&[v])))
            .sum();
        let mut full = independence + computer.structure_message_length(0);
        for step in explorer.steps() {
            prop_assert!(step.full() < full);
            prop_assert!(step.action.score.is_finite());
            full = step.full();
        }
        prop_assert!((exploration.full() - explorer.message_length()).abs() < 1e-6);
        if let Some(rejected) = exploration.rejected {
            prop_assert_eq!(exploration.termination, Termination::NoImprovement);
            prop_assert!(rejected.full >= exploration.full());
        }
    }

    #[test]
    fn search_keeps_the_graph_chordal(rows in tables()) {
        let data = dataset(&rows);
        let (explorer, _) = Explorer::build_model(&data, &SearchConfig::default()).unwrap();
        let model = explorer.model();
        prop_assert!(is_chordal(model));

        let computer = explorer.computer();
        let cliques: f64 = model.cliques().iter().map(|c| computer.message_length(c)).sum();
        let separators: f64 = model.separators().iter().map(|s| computer.message_length(s)).sum();
        prop_assert!((model.message_length() - (cliques - separators)).abs() < 1e-9);
    }

    #[test]
    fn search_is_deterministic(rows in tables()) {
        let data = dataset(&rows);
        let (first, _) = Explorer::build_model(&data, &SearchConfig::default()).unwrap();
        let (second, _) = Explorer::build_model(&data, &SearchConfig::default()).unwrap();
        prop_assert_eq!(first.actions(), second.actions());
    }
}
