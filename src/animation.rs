//! Property tweening.
//!
//! A [`Tween`] drives a single `f32` property towards a target value over a
//! fixed duration, optionally after a delay, shaped by an [`Ease`]. Creating
//! a tween hands out a [`TweenCompletion`]: a future that resolves once the
//! tween reaches its end, so whatever must wait for the animation can await or
//! poll it instead of hiding in a callback.

use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::channel::oneshot;

/// Easing curves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Ease {
    Linear,
    /// Symmetric polynomial ease-in-out. `PowerInOut(2)` is a cubic curve.
    PowerInOut(u8),
}

impl Ease {
    /// Map progress `p` in `0.0..=1.0` onto the curve.
    pub fn apply(&self, p: f32) -> f32 {
        let p = p.clamp(0.0, 1.0);
        match self {
            Ease::Linear => p,
            Ease::PowerInOut(power) => {
                let exponent = i32::from(*power) + 1;
                if p < 0.5 {
                    (p * 2.0).powi(exponent) / 2.0
                } else {
                    1.0 - ((1.0 - p) * 2.0).powi(exponent) / 2.0
                }
            }
        }
    }
}

/// Resolves when the tween that created it finishes.
///
/// Resolves to `Err(Canceled)` if the tween is dropped before finishing.
#[derive(Debug)]
pub struct TweenCompletion {
    receiver: oneshot::Receiver<()>,
    done: bool,
}

impl TweenCompletion {
    /// Non-blocking check. Once `true`, stays `true`.
    pub fn is_complete(&mut self) -> bool {
        if !self.done {
            self.done = matches!(self.receiver.try_recv(), Ok(Some(())));
        }
        self.done
    }
}

impl Future for TweenCompletion {
    type Output = Result<(), oneshot::Canceled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.done {
            return Poll::Ready(Ok(()));
        }
        let polled = Pin::new(&mut self.receiver).poll(cx);
        if let Poll::Ready(Ok(())) = polled {
            self.done = true;
        }
        polled
    }
}

#[derive(Debug)]
pub struct Tween {
    to: f32,
    from: Option<f32>,
    duration: Duration,
    delay: Duration,
    ease: Ease,
    elapsed: Duration,
    completion: Option<oneshot::Sender<()>>,
}

impl Tween {
    /// Tween a property to `to`. The start value is captured when the delay ends.
    pub fn to(to: f32, duration: Duration, delay: Duration, ease: Ease) -> (Self, TweenCompletion) {
        let (sender, receiver) = oneshot::channel();
        let tween = Self {
            to,
            from: None,
            duration,
            delay,
            ease,
            elapsed: Duration::ZERO,
            completion: Some(sender),
        };
        (
            tween,
            TweenCompletion {
                receiver,
                done: false,
            },
        )
    }

    pub fn is_finished(&self) -> bool {
        self.completion.is_none()
    }

    /// Advance by `dt` and write the eased value into `property`.
    ///
    /// Does nothing during the delay or after the tween finished.
    pub fn advance(&mut self, dt: Duration, property: &mut f32) {
        if self.is_finished() {
            return;
        }
        self.elapsed += dt;
        let Some(active) = self.elapsed.checked_sub(self.delay) else {
            return;
        };
        let from = *self.from.get_or_insert(*property);
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (active.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };
        *property = from + (self.to - from) * self.ease.apply(progress);
        if progress >= 1.0 {
            *property = self.to;
            if let Some(sender) = self.completion.take() {
                // The receiver may already be gone, nobody is waiting then.
                let _ = sender.send(());
            }
        }
    }
}
