use tokio::sync::watch;

#[derive(Clone)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownListener) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, ShutdownListener { receiver })
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl ShutdownListener {
    pub async fn notified(&mut self) {
        if *self.receiver.borrow() {
            return;
        }
        let _ = self.receiver.changed().await;
    }

    /// A dropped `Shutdown` counts as triggered: nobody is left to keep the task alive.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    pub async fn sleep(&mut self, duration: std::time::Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.notified() => false,
        }
    }
}

pub fn install_signal_handlers(shutdown: Shutdown) {
    let ctrlc = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc.trigger();
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let term = shutdown.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
                term.trigger();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_trigger() {
        let (shutdown, mut listener) = Shutdown::new();
        let handle = tokio::spawn(async move { listener.sleep(Duration::from_secs(600)).await });
        tokio::task::yield_now().await;
        shutdown.trigger();
        assert!(!handle.await.unwrap());
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn dropped_owner_counts_as_triggered() {
        let (shutdown, listener) = Shutdown::new();
        assert!(!listener.is_triggered());
        drop(shutdown);
        assert!(listener.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_trigger() {
        let (_shutdown, mut listener) = Shutdown::new();
        assert!(listener.sleep(Duration::from_secs(5)).await);
    }
}
