use std::str::FromStr;

/// Genotype prior used by the likelihood engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenotypePrior {
    /// Every considered genotype is equally likely
    Flat,
    /// Population prior parameterised by the per-base heterozygosity
    Population { heterozygosity: f64 },
}

impl Default for GenotypePrior {
    fn default() -> Self {
        GenotypePrior::Flat
    }
}

impl FromStr for GenotypePrior {
    type Err = String;
    fn from_str(prior: &str) -> Result<Self, Self::Err> {
        const DEFAULT_HETEROZYGOSITY: f64 = 0.001;
        match prior.split_once(':') {
            None if prior == "flat" => Ok(GenotypePrior::Flat),
            None if prior == "population" => Ok(GenotypePrior::Population {
                heterozygosity: DEFAULT_HETEROZYGOSITY,
            }),
            Some(("population", theta)) => {
                let heterozygosity: f64 = theta
                    .parse()
                    .map_err(|_| format!("Invalid heterozygosity: {}", theta))?;
                if !(heterozygosity > 0.0 && heterozygosity < 0.5) {
                    return Err(format!(
                        "Heterozygosity must be in (0, 0.5), got {}",
                        heterozygosity
                    ));
                }
                Ok(GenotypePrior::Population { heterozygosity })
            }
            _ => Err(format!(
                "Invalid prior '{}'. Options are: flat, population[:THETA]",
                prior
            )),
        }
    }
}

/// Confidence discount applied to evidence as a function of distance to the peak summit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SummitDiscount {
    #[default]
    None,
    /// Weight falls linearly to `floor` at `half_width` bases from the summit
    Linear { half_width: u32, floor: f64 },
    /// Weight `exp(-d / scale)`, bounded below by `floor`
    Exponential { scale: f64, floor: f64 },
}

impl SummitDiscount {
    /// Weight in `(0, 1]` given to evidence `distance` bases away from the summit.
    pub fn weight(&self, distance: u32) -> f64 {
        match *self {
            SummitDiscount::None => 1.0,
            SummitDiscount::Linear { half_width, floor } => {
                let frac = distance as f64 / half_width.max(1) as f64;
                (1.0 - frac).max(floor)
            }
            SummitDiscount::Exponential { scale, floor } => {
                (-(distance as f64) / scale).exp().max(floor)
            }
        }
    }
}

impl FromStr for SummitDiscount {
    type Err = String;
    fn from_str(encoding: &str) -> Result<Self, Self::Err> {
        const FLOOR: f64 = 0.1;
        let error_msg = || {
            format!(
                "Invalid summit discount '{}'. Options are: none, linear:HALF_WIDTH, exp:SCALE",
                encoding
            )
        };
        match encoding.split_once(':') {
            None if encoding == "none" => Ok(SummitDiscount::None),
            Some(("linear", width)) => {
                let half_width: u32 = width.parse().map_err(|_| error_msg())?;
                if half_width == 0 {
                    return Err(error_msg());
                }
                Ok(SummitDiscount::Linear {
                    half_width,
                    floor: FLOOR,
                })
            }
            Some(("exp", scale)) => {
                let scale: f64 = scale.parse().map_err(|_| error_msg())?;
                if scale <= 0.0 {
                    return Err(error_msg());
                }
                Ok(SummitDiscount::Exponential {
                    scale,
                    floor: FLOOR,
                })
            }
            _ => Err(error_msg()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_priors() {
        assert_eq!("flat".parse::<GenotypePrior>(), Ok(GenotypePrior::Flat));
        assert_eq!(
            "population:0.01".parse::<GenotypePrior>(),
            Ok(GenotypePrior::Population {
                heterozygosity: 0.01
            })
        );
        assert!("population:0.7".parse::<GenotypePrior>().is_err());
        assert!("uniform".parse::<GenotypePrior>().is_err());
    }

    #[test]
    fn discount_weights_are_bounded() {
        let linear: SummitDiscount = "linear:100".parse().unwrap();
        assert_eq!(linear.weight(0), 1.0);
        assert_eq!(linear.weight(50), 0.5);
        assert_eq!(linear.weight(1000), 0.1);

        let exp: SummitDiscount = "exp:50".parse().unwrap();
        assert!(exp.weight(50) < 0.37 && exp.weight(50) > 0.36);
        assert_eq!(SummitDiscount::None.weight(10_000), 1.0);
        assert!("linear:0".parse::<SummitDiscount>().is_err());
    }
}
