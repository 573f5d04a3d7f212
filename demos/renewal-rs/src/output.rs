use epiaware::ModelOutput;

#[derive(Default)]
pub struct RenewalOutput {
    pub rt: Vec<f64>,
    pub infection_incidence: Vec<f64>,
    pub expected_cases: Vec<f64>,
    pub cases: Vec<u64>,
}

impl RenewalOutput {
    pub const HEADERS: [&'static str; 6] = [
        "replicate",
        "step",
        "rt",
        "infections",
        "expected_cases",
        "cases",
    ];

    /// Keeps the simulated steps only; the seeding window is dropped.
    pub fn from_model(output: &ModelOutput) -> RenewalOutput {
        RenewalOutput {
            rt: output.rt.clone(),
            infection_incidence: output.infections.simulated().to_vec(),
            expected_cases: output.expected_cases.clone(),
            cases: output.cases.clone(),
        }
    }

    pub fn rows(&self, replicate: u64) -> Vec<Vec<String>> {
        (0..self.rt.len())
            .map(|i| {
                vec![
                    replicate.to_string(),
                    i.to_string(),
                    self.rt[i].to_string(),
                    self.infection_incidence[i].to_string(),
                    self.expected_cases[i].to_string(),
                    self.cases[i].to_string(),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rows() {
        let output = RenewalOutput {
            rt: vec![1.5, 1.25],
            infection_incidence: vec![10.0, 12.5],
            expected_cases: vec![5.0, 11.25],
            cases: vec![4, 13],
        };
        let rows = output.rows(3);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["3", "1", "1.25", "12.5", "11.25", "13"]);
        assert_eq!(rows[0].len(), RenewalOutput::HEADERS.len());
        assert_eq!(&RenewalOutput::HEADERS[..2], &["replicate", "step"]);
    }
}
