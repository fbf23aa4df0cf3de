use glam::Vec2;

use crate::error::KalmanError;

// prior variances of a freshly seeded filter
const PRIOR_POSITION_VARIANCE: f32 = 1e4;
const PRIOR_VELOCITY_VARIANCE: f32 = 1.0;

/// 4x4 matrix stored row major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    /// Rows of the matrix.
    pub data: [[f32; 4]; 4],
}

impl Mat4 {
    /// All zeros.
    pub fn zeros() -> Self {
        Self {
            data: [[0.0; 4]; 4],
        }
    }

    /// Identity.
    pub fn identity() -> Self {
        Self::diagonal([1.0; 4])
    }

    /// Diagonal matrix.
    pub fn diagonal(d: [f32; 4]) -> Self {
        let mut m = Self::zeros();
        for (i, v) in d.into_iter().enumerate() {
            m.data[i][i] = v;
        }
        m
    }

    /// Multiply every element by `s`.
    pub fn scale(&self, s: f32) -> Self {
        let mut m = *self;
        m.data.iter_mut().flatten().for_each(|v| *v *= s);
        m
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Self) -> Self {
        let mut m = *self;
        for i in 0..4 {
            for j in 0..4 {
                m.data[i][j] += other.data[i][j];
            }
        }
        m
    }

    /// Matrix product.
    pub fn mul(&self, other: &Self) -> Self {
        let mut m = Self::zeros();
        for i in 0..4 {
            for j in 0..4 {
                m.data[i][j] = (0..4).map(|k| self.data[i][k] * other.data[k][j]).sum();
            }
        }
        m
    }

    /// Transpose.
    pub fn transpose(&self) -> Self {
        let mut m = Self::zeros();
        for i in 0..4 {
            for j in 0..4 {
                m.data[j][i] = self.data[i][j];
            }
        }
        m
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, v: &[f32; 4]) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (0..4).map(|k| self.data[i][k] * v[k]).sum();
        }
        out
    }

    fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|v| v.is_finite())
    }
}

// x += vx, y += vy per frame
const TRANSITION: Mat4 = Mat4 {
    data: [
        [1.0, 1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 1.0],
        [0.0, 0.0, 0.0, 1.0],
    ],
};

/// Constant velocity Kalman filter over the state `[x, vx, y, vy]`.
///
/// Only the position is observed. Process and measurement covariances are
/// scaled identities.
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanFilter {
    mean: [f32; 4],
    covariance: Mat4,
    process_noise: Mat4,
    measurement_noise: f32,
    #[cfg(test)]
    pub(crate) fail_next_correct: bool,
}

impl KalmanFilter {
    /// A filter with an uninformative prior: zero mean, a very wide position
    /// variance and unit velocity variance.
    pub fn new(process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            mean: [0.0; 4],
            covariance: Mat4::diagonal([
                PRIOR_POSITION_VARIANCE,
                PRIOR_VELOCITY_VARIANCE,
                PRIOR_POSITION_VARIANCE,
                PRIOR_VELOCITY_VARIANCE,
            ]),
            process_noise: Mat4::identity().scale(process_noise),
            measurement_noise,
            #[cfg(test)]
            fail_next_correct: false,
        }
    }

    /// The state mean `[x, vx, y, vy]`.
    pub fn mean(&self) -> [f32; 4] {
        self.mean
    }

    /// The state covariance.
    pub fn covariance(&self) -> &Mat4 {
        &self.covariance
    }

    /// Estimated position.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.mean[0], self.mean[2])
    }

    /// Estimated velocity, in pixels per frame.
    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.mean[1], self.mean[3])
    }

    /// Advance the state by one frame.
    pub fn predict(&mut self) {
        self.mean = TRANSITION.mul_vec(&self.mean);
        self.covariance = TRANSITION
            .mul(&self.covariance)
            .mul(&TRANSITION.transpose())
            .add(&self.process_noise);
    }

    /// Fuse a position observation into the state.
    ///
    /// On error the filter may be left half updated; use [`KalmanFilter::step`]
    /// to keep it consistent.
    pub fn correct(&mut self, z: Vec2) -> Result<(), KalmanError> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_correct) {
            return Err(KalmanError::NonFinite);
        }

        let p = &self.covariance.data;
        let r = self.measurement_noise;

        // S = H P H^T + R, with H selecting x and y
        let s = [[p[0][0] + r, p[0][2]], [p[2][0], p[2][2] + r]];
        let det = s[0][0] * s[1][1] - s[0][1] * s[1][0];
        if !det.is_finite() || det.abs() <= f32::EPSILON {
            return Err(KalmanError::SingularInnovation(det));
        }
        let s_inv = [
            [s[1][1] / det, -s[0][1] / det],
            [-s[1][0] / det, s[0][0] / det],
        ];

        // K = P H^T S^-1
        let mut gain = [[0.0f32; 2]; 4];
        for (i, row) in gain.iter_mut().enumerate() {
            let pht = [p[i][0], p[i][2]];
            row[0] = pht[0] * s_inv[0][0] + pht[1] * s_inv[1][0];
            row[1] = pht[0] * s_inv[0][1] + pht[1] * s_inv[1][1];
        }

        let innovation = [z.x - self.mean[0], z.y - self.mean[2]];
        let mut mean = self.mean;
        for (m, k) in mean.iter_mut().zip(gain.iter()) {
            *m += k[0] * innovation[0] + k[1] * innovation[1];
        }

        // P = (I - K H) P
        let mut covariance = self.covariance;
        for i in 0..4 {
            for j in 0..4 {
                covariance.data[i][j] -= gain[i][0] * p[0][j] + gain[i][1] * p[2][j];
            }
        }

        if !mean.iter().all(|v| v.is_finite()) || !covariance.is_finite() {
            return Err(KalmanError::NonFinite);
        }

        self.mean = mean;
        self.covariance = covariance;
        Ok(())
    }

    /// Predict and then correct with `z`, committing only if both succeed.
    pub fn step(&mut self, z: Vec2) -> Result<(), KalmanError> {
        let mut next = self.clone();
        next.predict();
        let result = next.correct(z);

        #[cfg(test)]
        {
            self.fail_next_correct = next.fail_next_correct;
        }

        if result.is_ok() {
            *self = next;
        }
        result
    }
}
