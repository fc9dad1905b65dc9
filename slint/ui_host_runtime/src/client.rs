use crate::channel::{Channel, ChannelConfig};
use crate::protocol::ServerFrame;
use crate::reconcile::DiffOutcome;
use crate::session::Session;
use crate::transport::Transport;
use std::cell::RefCell;
use std::rc::Rc;

type FrameObserver = Box<dyn FnMut(&ServerFrame, &DiffOutcome)>;

/// One session bound to one channel.
///
/// Inbound frames go to the session in arrival order; the session's
/// environment supplies the initial updates for every connect. Everything
/// runs on the caller's thread.
pub struct Client<H: 'static, T: Transport> {
    channel: Channel<T>,
    session: Rc<RefCell<Session<H>>>,
    after_frame: Rc<RefCell<Vec<FrameObserver>>>,
}

impl<H: 'static, T: Transport> Client<H, T> {
    pub fn new(transport: T, config: ChannelConfig, session: Session<H>) -> Self {
        let channel = Channel::new(transport, config, session.outbox().clone());
        let session = Rc::new(RefCell::new(session));
        let after_frame: Rc<RefCell<Vec<FrameObserver>>> = Rc::default();

        {
            let session = session.clone();
            channel.set_initial_updates(move || session.borrow().initial_updates());
        }

        {
            let session = session.clone();
            let after_frame = after_frame.clone();
            channel.on_message(move |frame| {
                let outcome = session.borrow_mut().handle_frame(frame);
                if !outcome.is_clean() {
                    tracing::debug!(
                        applied = outcome.applied,
                        errors = outcome.errors.len(),
                        "frame applied with skipped steps"
                    );
                }

                for observer in after_frame.borrow_mut().iter_mut() {
                    observer(frame, &outcome);
                }
            });
        }

        Self {
            channel,
            session,
            after_frame,
        }
    }

    pub fn session(&self) -> Rc<RefCell<Session<H>>> {
        self.session.clone()
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// Runs after the session has handled a frame, with the session no
    /// longer borrowed.
    pub fn on_frame_applied(&self, observer: impl FnMut(&ServerFrame, &DiffOutcome) + 'static) {
        self.after_frame.borrow_mut().push(Box::new(observer));
    }

    pub async fn run(self) {
        self.channel.run().await;
    }
}
