use crate::models::{
    AverageLabels, Averages, HealthSummary, QualityVerdict, Recommendation, Severity, Status,
    Timeline, Verdicts,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    OneDecimal,
    Whole,
}

impl Precision {
    fn round(self, value: f64) -> f64 {
        match self {
            Precision::OneDecimal => (value * 10.0).round() / 10.0,
            Precision::Whole => value.round(),
        }
    }

    pub fn format(self, value: Option<f64>) -> String {
        match value {
            Some(value) => match self {
                Precision::OneDecimal => format!("{value:.1}"),
                Precision::Whole => format!("{value:.0}"),
            },
            None => "-".to_string(),
        }
    }
}

/// A single averaged value ready for classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Weight(Option<f64>),
    Height(Option<f64>),
    Bmi(Option<f64>),
    BloodPressure { sys: Option<f64>, dia: Option<f64> },
    Spo2(Option<f64>),
    Sugar(Option<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BmiBand {
    Under,
    Normal,
    Over,
    Obese,
}

const BMI_NORMAL: Recommendation = Recommendation {
    icon: "bi-check-circle-fill",
    title: "BMI ปกติ",
    text: "น้ำหนักอยู่ในเกณฑ์ดี รักษาการออกกำลังกายและอาหารที่สมดุลต่อไป",
    severity: Severity::Good,
};

const BMI_UNDER: Recommendation = Recommendation {
    icon: "bi-exclamation-circle",
    title: "น้ำหนักต่ำกว่าเกณฑ์",
    text: "ควรรับประทานอาหารที่มีโปรตีนและพลังงานเพียงพอ",
    severity: Severity::Warning,
};

const BMI_OVER: Recommendation = Recommendation {
    icon: "bi-exclamation-triangle",
    title: "น้ำหนักเกินเกณฑ์",
    text: "ควรควบคุมอาหารและออกกำลังกายสม่ำเสมออย่างน้อย 150 นาทีต่อสัปดาห์",
    severity: Severity::Warning,
};

const BMI_OBESE: Recommendation = Recommendation {
    icon: "bi-exclamation-octagon",
    title: "ภาวะอ้วน",
    text: "ควรปรึกษาแพทย์เพื่อวางแผนลดน้ำหนักอย่างเหมาะสม",
    severity: Severity::Danger,
};

const BP_ELEVATED: Recommendation = Recommendation {
    icon: "bi-heart-pulse",
    title: "ความดันเริ่มสูง",
    text: "ลดอาหารเค็ม งดบุหรี่และแอลกอฮอล์ และวัดความดันซ้ำสม่ำเสมอ",
    severity: Severity::Warning,
};

const BP_HIGH: Recommendation = Recommendation {
    icon: "bi-heart-pulse-fill",
    title: "ความดันโลหิตสูง",
    text: "ควรพบแพทย์เพื่อตรวจประเมินความดันโลหิต",
    severity: Severity::Danger,
};

const SPO2_LOW: Recommendation = Recommendation {
    icon: "bi-lungs",
    title: "ออกซิเจนในเลือดต่ำกว่าปกติ",
    text: "ฝึกหายใจลึก ๆ และติดตามค่าอย่างใกล้ชิด",
    severity: Severity::Warning,
};

const SPO2_CRITICAL: Recommendation = Recommendation {
    icon: "bi-lungs-fill",
    title: "ออกซิเจนในเลือดต่ำมาก",
    text: "ควรพบแพทย์โดยเร็ว",
    severity: Severity::Danger,
};

const SUGAR_ELEVATED: Recommendation = Recommendation {
    icon: "bi-droplet",
    title: "น้ำตาลในเลือดเริ่มสูง",
    text: "ลดอาหารหวานและแป้ง และตรวจน้ำตาลซ้ำ",
    severity: Severity::Warning,
};

const SUGAR_HIGH: Recommendation = Recommendation {
    icon: "bi-droplet-fill",
    title: "น้ำตาลในเลือดสูง",
    text: "ควรพบแพทย์เพื่อตรวจยืนยันภาวะเบาหวาน",
    severity: Severity::Danger,
};

const NO_DATA: Recommendation = Recommendation {
    icon: "bi-info-circle",
    title: "ข้อมูลไม่เพียงพอ",
    text: "บันทึกข้อมูลสุขภาพเพิ่มเติมเพื่อรับคำแนะนำ",
    severity: Severity::Info,
};

/// Mean of the recorded values in `series`, rounded to `precision`.
///
/// Values that are not strictly positive count as "not recorded". Returns
/// `None` when nothing in the series qualifies.
pub fn compute_average<R>(
    series: &[R],
    extract: impl Fn(&R) -> Option<f64>,
    precision: Precision,
) -> Option<f64> {
    let (sum, count) = series
        .iter()
        .filter_map(|reading| recorded(extract(reading)))
        .fold((0.0, 0u32), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        return None;
    }

    Some(precision.round(sum / f64::from(count)))
}

pub fn averages(timeline: &Timeline) -> Averages {
    Averages {
        weight: compute_average(&timeline.weight_bmi, |r| r.weight, Precision::OneDecimal),
        height: compute_average(&timeline.weight_bmi, |r| r.height, Precision::OneDecimal),
        bmi: compute_average(&timeline.weight_bmi, |r| r.bmi, Precision::OneDecimal),
        sys: compute_average(&timeline.blood_pressure, |r| r.sys, Precision::Whole),
        dia: compute_average(&timeline.blood_pressure, |r| r.dia, Precision::Whole),
        spo2: compute_average(&timeline.o2, |r| r.spo2, Precision::OneDecimal),
        sugar: compute_average(&timeline.sugar, |r| r.sugar, Precision::Whole),
    }
}

pub fn classify(measurement: Measurement) -> QualityVerdict {
    match measurement {
        Measurement::Weight(value) | Measurement::Height(value) => match recorded(value) {
            Some(value) => QualityVerdict::new(Status::Neutral, format!("{value:.1}")),
            None => QualityVerdict::neutral(),
        },
        Measurement::Bmi(value) => match recorded(value).map(bmi_band) {
            Some(BmiBand::Under) => QualityVerdict::new(Status::Warning, "ผอม"),
            Some(BmiBand::Normal) => QualityVerdict::new(Status::Good, "ปกติ"),
            Some(BmiBand::Over) => QualityVerdict::new(Status::Warning, "น้ำหนักเกิน"),
            Some(BmiBand::Obese) => QualityVerdict::new(Status::Danger, "อ้วน"),
            None => QualityVerdict::neutral(),
        },
        Measurement::BloodPressure { sys, dia } => match (recorded(sys), recorded(dia)) {
            (Some(sys), Some(dia)) if sys >= 140.0 || dia >= 90.0 => {
                QualityVerdict::new(Status::Danger, "สูง")
            }
            (Some(sys), Some(dia)) if sys >= 120.0 || dia >= 80.0 => {
                QualityVerdict::new(Status::Warning, "เริ่มสูง")
            }
            (Some(_), Some(_)) => QualityVerdict::new(Status::Good, "ปกติ"),
            _ => QualityVerdict::neutral(),
        },
        Measurement::Spo2(value) => match recorded(value) {
            Some(value) if value >= 95.0 => QualityVerdict::new(Status::Good, "ปกติ"),
            Some(value) if value >= 90.0 => QualityVerdict::new(Status::Warning, "ต่ำ"),
            Some(_) => QualityVerdict::new(Status::Danger, "ต่ำมาก"),
            None => QualityVerdict::neutral(),
        },
        Measurement::Sugar(value) => match recorded(value) {
            Some(value) if value < 100.0 => QualityVerdict::new(Status::Good, "ปกติ"),
            Some(value) if value < 126.0 => {
                QualityVerdict::new(Status::Warning, "เสี่ยงเบาหวาน")
            }
            Some(_) => QualityVerdict::new(Status::Danger, "เบาหวาน"),
            None => QualityVerdict::neutral(),
        },
    }
}

pub fn verdicts(averages: &Averages) -> Verdicts {
    Verdicts {
        weight: classify(Measurement::Weight(averages.weight)),
        height: classify(Measurement::Height(averages.height)),
        bmi: classify(Measurement::Bmi(averages.bmi)),
        blood_pressure: classify(Measurement::BloodPressure {
            sys: averages.sys,
            dia: averages.dia,
        }),
        spo2: classify(Measurement::Spo2(averages.spo2)),
        sugar: classify(Measurement::Sugar(averages.sugar)),
    }
}

pub fn build_recommendations(timeline: &Timeline) -> Vec<Recommendation> {
    recommendations_for(&averages(timeline))
}

fn recommendations_for(averages: &Averages) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    match recorded(averages.bmi).map(bmi_band) {
        Some(BmiBand::Normal) => recommendations.push(BMI_NORMAL),
        Some(BmiBand::Under) => recommendations.push(BMI_UNDER),
        Some(BmiBand::Over) => recommendations.push(BMI_OVER),
        Some(BmiBand::Obese) => recommendations.push(BMI_OBESE),
        None => {}
    }

    let pressure = classify(Measurement::BloodPressure {
        sys: averages.sys,
        dia: averages.dia,
    });
    push_finding(&mut recommendations, pressure.status, BP_ELEVATED, BP_HIGH);

    let oxygen = classify(Measurement::Spo2(averages.spo2));
    push_finding(&mut recommendations, oxygen.status, SPO2_LOW, SPO2_CRITICAL);

    let sugar = classify(Measurement::Sugar(averages.sugar));
    push_finding(&mut recommendations, sugar.status, SUGAR_ELEVATED, SUGAR_HIGH);

    if recommendations.is_empty() {
        recommendations.push(NO_DATA);
    }

    recommendations
}

pub fn summarize(timeline: &Timeline) -> HealthSummary {
    let averages = averages(timeline);
    let display = AverageLabels {
        weight: Precision::OneDecimal.format(averages.weight),
        height: Precision::OneDecimal.format(averages.height),
        bmi: Precision::OneDecimal.format(averages.bmi),
        blood_pressure: match (averages.sys, averages.dia) {
            (Some(sys), Some(dia)) => format!("{sys:.0}/{dia:.0}"),
            _ => "-".to_string(),
        },
        spo2: Precision::OneDecimal.format(averages.spo2),
        sugar: Precision::Whole.format(averages.sugar),
    };

    HealthSummary {
        verdicts: verdicts(&averages),
        recommendations: recommendations_for(&averages),
        display,
        averages,
    }
}

fn push_finding(
    recommendations: &mut Vec<Recommendation>,
    status: Status,
    warning: Recommendation,
    danger: Recommendation,
) {
    match status {
        Status::Warning => recommendations.push(warning),
        Status::Danger => recommendations.push(danger),
        Status::Good | Status::Neutral => {}
    }
}

fn recorded(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite() && *value > 0.0)
}

fn bmi_band(value: f64) -> BmiBand {
    if value >= 30.0 {
        BmiBand::Obese
    } else if value >= 25.0 {
        BmiBand::Over
    } else if value >= 18.5 {
        BmiBand::Normal
    } else {
        BmiBand::Under
    }
}
