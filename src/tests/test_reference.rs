use crate::dictionary::{DictionaryLearner, DictionaryModel};
use crate::error::Error;
use crate::io::{save_model, write_dense_csv};
use crate::reference::*;
use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::TempDir;

use super::test_data::genre_columns;

fn small_model() -> DictionaryModel {
    DictionaryLearner::new()
        .with_atoms(4)
        .with_weights(0.5, 0.05, 0.0)
        .with_outer(8, 1e-8)
        .with_seed(11)
        .fit(&genre_columns(4, 31), None)
        .unwrap()
}

fn as_reference(model: &DictionaryModel) -> ReferenceSolution {
    ReferenceSolution {
        dictionary: model.dictionary.clone(),
        encoder: model.encoder.clone(),
        codes: model.codes.clone(),
        objective: Some(model.final_objective()),
    }
}

#[test]
fn test_self_comparison_matches() {
    let model = small_model();
    let cmp = compare(&model, &as_reference(&model), 1e-6).unwrap();
    assert!(cmp.matches);
    assert_eq!(cmp.dictionary_error, 0.0);
    assert_eq!(cmp.codes_error, 0.0);
    assert_eq!(cmp.objective_gap, Some(0.0));
    assert_eq!(cmp.code_sparsity, cmp.reference_code_sparsity);
}

#[test]
fn test_perturbed_reference_differs() {
    let model = small_model();
    let mut reference = as_reference(&model);
    reference.dictionary.mapv_inplace(|v| v * 1.5);

    let cmp = compare(&model, &reference, 1e-2).unwrap();
    assert!(!cmp.matches);
    assert_abs_diff_eq!(cmp.dictionary_error, 1.0 / 3.0, epsilon = 1e-9);
    assert_eq!(cmp.encoder_error, 0.0);

    let text = format!("{}", cmp);
    assert!(text.contains("Matches: false"));
}

#[test]
fn test_objective_gap_alone_fails() {
    let model = small_model();
    let mut reference = as_reference(&model);
    reference.objective = Some(model.final_objective() * 0.5);

    let cmp = compare(&model, &reference, 1e-3).unwrap();
    assert!(!cmp.matches);
    assert_abs_diff_eq!(cmp.objective_gap.unwrap(), 1.0, epsilon = 1e-9);

    reference.objective = None;
    let cmp = compare(&model, &reference, 1e-3).unwrap();
    assert!(cmp.matches);
    assert!(format!("{}", cmp).contains("no reference value"));
}

#[test]
fn test_shape_mismatch() {
    let model = small_model();
    let mut reference = as_reference(&model);
    reference.codes = Array2::zeros((3, 12));
    assert!(matches!(
        compare(&model, &reference, 1e-2),
        Err(Error::Shape { .. })
    ));
}

#[test]
fn test_save_and_load_round_trip() {
    let model = small_model();
    let dir = TempDir::new().unwrap();
    save_model(dir.path(), &model).unwrap();

    for name in ["D.csv", "E.csv", "Z.csv", "objective.csv", "history.csv", "params.json"] {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }

    let reference = ReferenceSolution::load(dir.path()).unwrap();
    assert_eq!(reference.dictionary, model.dictionary);
    assert_eq!(reference.codes, model.codes);
    assert_eq!(reference.objective, Some(model.final_objective()));

    let cmp = compare(&model, &reference, 1e-9).unwrap();
    assert!(cmp.matches);
}

#[test]
fn test_load_without_objective() {
    let dir = TempDir::new().unwrap();
    write_dense_csv(dir.path().join("D.csv"), &Array2::eye(3)).unwrap();
    write_dense_csv(dir.path().join("E.csv"), &Array2::eye(3)).unwrap();
    write_dense_csv(dir.path().join("Z.csv"), &Array2::zeros((3, 5))).unwrap();

    let reference = ReferenceSolution::load(dir.path()).unwrap();
    assert_eq!(reference.objective, None);
    assert_eq!(reference.codes.dim(), (3, 5));
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    write_dense_csv(dir.path().join("D.csv"), &Array2::eye(2)).unwrap();
    assert!(ReferenceSolution::load(dir.path()).is_err());
}
